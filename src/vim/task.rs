//! Waiting on vim25 tasks.
//!
//! ```text
//! wait_for_task(task)
//!     └─► GET Task/<id>/info  ──► queued / running ──► sleep(backoff) ──┐
//!             ▲                                                         │
//!             └─────────────────────────────────────────────────────────┘
//!         success ──► Succeeded      error ──► Failed(reason)
//!         cancel signal (any time) ──► Cancelled(reason)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::error::ApiError;
use crate::protocol::{ManagedObjectRef, TaskInfo, TaskState};
use crate::vim::TaskOutcome;

/// Exponential backoff between task polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(5),
        }
    }
}

impl PollPolicy {
    fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// Anything that can report the current `TaskInfo` of a task.
#[async_trait]
pub trait TaskInfoSource: Send + Sync {
    async fn task_info(&self, task: &ManagedObjectRef) -> Result<TaskInfo, ApiError>;
}

/// Poll `task` until it reaches a terminal state or `cancel` fires.
///
/// Cancellation interrupts both the sleep and an in-flight poll. It never
/// touches the server-side task.
pub async fn wait_for_task<S: TaskInfoSource + ?Sized>(
    source: &S,
    task: &ManagedObjectRef,
    policy: &PollPolicy,
    cancel: &CancelSignal,
) -> Result<TaskOutcome, ApiError> {
    let mut delay = policy.initial;

    loop {
        let info = tokio::select! {
            biased;
            reason = cancel.cancelled() => {
                info!(task = %task, %reason, "stopped waiting for task");
                return Ok(TaskOutcome::Cancelled(reason));
            }
            info = source.task_info(task) => info?,
        };

        match info.state {
            TaskState::Success => {
                info!(
                    task = %task,
                    completed = ?info.complete_time,
                    "task succeeded"
                );
                return Ok(TaskOutcome::Succeeded);
            }
            TaskState::Error => {
                let reason = info.failure_reason();
                info!(task = %task, %reason, "task failed");
                return Ok(TaskOutcome::Failed { reason });
            }
            TaskState::Queued | TaskState::Running => {
                debug!(
                    task = %task,
                    state = ?info.state,
                    progress = ?info.progress,
                    next_poll_ms = delay.as_millis() as u64,
                    "task in progress"
                );
            }
        }

        tokio::select! {
            biased;
            reason = cancel.cancelled() => {
                info!(task = %task, %reason, "stopped waiting for task");
                return Ok(TaskOutcome::Cancelled(reason));
            }
            _ = tokio::time::sleep(delay) => {}
        }
        delay = policy.next(delay);
    }
}
