//! Applying a resolved mask list to a VM.
//!
//! Submission and completion are separate: a refused submission surfaces as
//! [`EvcError::ApplyRejected`] immediately; an accepted one is awaited until
//! the task is terminal or the cancel signal fires. Cancelling only stops
//! the wait; the server-side task is left alone.

use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::error::{EvcError, Step};
use crate::protocol::{ApplyEvcModeBody, FeatureMask, ManagedObjectRef, NamedRef, WireFeatureMask};
use crate::vim::{TaskOutcome, TaskService};

/// Payload of one `ApplyEvcModeVM_Task` call.
///
/// Always carries `completeMasks = true`: the masks come from a full
/// baseline lookup and replace the VM's mask set as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    vm: ManagedObjectRef,
    masks: Vec<FeatureMask>,
    complete_masks: bool,
}

impl ApplyRequest {
    pub fn new(vm: ManagedObjectRef, masks: Vec<FeatureMask>) -> Self {
        Self {
            vm,
            masks,
            complete_masks: true,
        }
    }

    pub fn vm(&self) -> &ManagedObjectRef {
        &self.vm
    }

    pub fn masks(&self) -> &[FeatureMask] {
        &self.masks
    }

    pub fn complete_masks(&self) -> bool {
        self.complete_masks
    }

    /// Wire body, masks in request order.
    pub fn body(&self) -> ApplyEvcModeBody<'_> {
        ApplyEvcModeBody {
            mask: self.masks.iter().map(WireFeatureMask::from).collect(),
            complete_masks: self.complete_masks,
        }
    }
}

pub struct EvcApplier<'a, T: TaskService + ?Sized> {
    tasks: &'a T,
}

impl<'a, T: TaskService + ?Sized> EvcApplier<'a, T> {
    pub fn new(tasks: &'a T) -> Self {
        Self { tasks }
    }

    /// Apply `masks` to `vm` and wait for the task to finish.
    ///
    /// Returns the task reference on success.
    pub async fn apply(
        &self,
        vm: &NamedRef,
        baseline: &str,
        masks: Vec<FeatureMask>,
        cancel: &CancelSignal,
    ) -> Result<ManagedObjectRef, EvcError> {
        let request = ApplyRequest::new(vm.reference.clone(), masks);

        let task = self
            .tasks
            .apply_evc_mode(&request)
            .await
            .map_err(|source| EvcError::ApplyRejected {
                vm: vm.name.clone(),
                baseline: baseline.to_string(),
                source,
            })?;
        info!(vm = %vm.name, baseline, task = %task, "EVC task submitted");

        let outcome = self.tasks.wait(&task, cancel).await.map_err(|source| {
            debug!(task = %task, error = %source, "lost track of EVC task");
            EvcError::TaskUnobservable {
                task: task.value.clone(),
                source,
            }
        })?;

        match outcome {
            TaskOutcome::Succeeded => {
                info!(vm = %vm.name, baseline, task = %task, "EVC mode applied");
                Ok(task)
            }
            TaskOutcome::Failed { reason } => Err(EvcError::OperationFailed {
                vm: vm.name.clone(),
                baseline: baseline.to_string(),
                task: task.value,
                reason,
            }),
            TaskOutcome::Cancelled(reason) => Err(EvcError::Cancelled {
                step: Step::AwaitTask,
                task: Some(task.value),
                reason,
            }),
        }
    }
}
