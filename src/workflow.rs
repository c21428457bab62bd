//! The evc-apply run, start to finish.
//!
//! ```text
//! validate ─► connect ─► datacenter ─► VM ─► cluster ─► masks ─► print ─► apply ─► wait
//! ```
//!
//! Validation happens before the connector is touched. Every step up to the
//! submission is raced against the cancel signal; nothing has changed on the
//! server at that point, so stopping there is clean. Once the task is
//! submitted only the wait is cancellable.

use std::future::Future;
use std::io::Write;

use tracing::info;

use crate::cancel::CancelSignal;
use crate::config::{ApplyJob, Invocation, Job, Settings};
use crate::error::{EvcError, Step};
use crate::evc::{BaselineMaskResolver, EvcApplier, InventoryResolver};
use crate::protocol::ManagedObjectRef;
use crate::report;
use crate::vim::{Connector, Inventory, PropertyCollector, TaskService};

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied {
        vm: String,
        baseline: String,
        task: ManagedObjectRef,
    },
    DryRun {
        vm: String,
        baseline: String,
        masks: usize,
    },
    Listed {
        cluster: String,
        baselines: usize,
    },
}

/// Validate `settings`, then execute against `connector`.
pub async fn run<C, W>(
    settings: &Settings,
    connector: &C,
    cancel: &CancelSignal,
    out: &mut W,
) -> Result<Outcome, EvcError>
where
    C: Connector + ?Sized,
    W: Write + ?Sized,
{
    let invocation = settings.validate()?;
    execute(&invocation, connector, cancel, out).await
}

pub async fn execute<C, W>(
    invocation: &Invocation,
    connector: &C,
    cancel: &CancelSignal,
    out: &mut W,
) -> Result<Outcome, EvcError>
where
    C: Connector + ?Sized,
    W: Write + ?Sized,
{
    let target = &invocation.target;
    let session = guarded(cancel, Step::Connect, async {
        connector
            .connect(target)
            .await
            .map_err(|source| EvcError::Connection {
                endpoint: target.endpoint.to_string(),
                auth: source.is_auth_failure(),
                source,
            })
    })
    .await?;
    info!(endpoint = %target.endpoint, user = %target.credentials.username, "connected");

    match &invocation.job {
        Job::Apply(job) => apply(&session, job, cancel, out).await,
        Job::ListBaselines { cluster } => list(&session, cluster, cancel, out).await,
    }
}

async fn apply<S, W>(
    session: &S,
    job: &ApplyJob,
    cancel: &CancelSignal,
    out: &mut W,
) -> Result<Outcome, EvcError>
where
    S: Inventory + PropertyCollector + TaskService,
    W: Write + ?Sized,
{
    let inventory = InventoryResolver::new(session);
    let scope = guarded(
        cancel,
        Step::ResolveDatacenter,
        inventory.resolve_datacenter(&job.datacenter),
    )
    .await?;
    let vm = guarded(cancel, Step::ResolveVm, inventory.resolve_vm(&scope, &job.vm)).await?;
    let cluster = guarded(
        cancel,
        Step::ResolveCluster,
        inventory.resolve_cluster(&job.cluster),
    )
    .await?;

    let masks = guarded(
        cancel,
        Step::ResolveBaseline,
        BaselineMaskResolver::new(session).resolve_masks(&cluster, &job.baseline),
    )
    .await?;
    report::write_masks(out, &masks)?;

    if job.dry_run {
        report::write_dry_run(out, &job.baseline, &job.vm)?;
        info!(vm = %job.vm, baseline = %job.baseline, "dry run, nothing submitted");
        return Ok(Outcome::DryRun {
            vm: job.vm.clone(),
            baseline: job.baseline.clone(),
            masks: masks.len(),
        });
    }

    if let Some(reason) = cancel.reason() {
        return Err(EvcError::Cancelled {
            step: Step::SubmitApply,
            task: None,
            reason,
        });
    }
    report::write_applying(out, &job.baseline, &job.vm)?;

    let task = EvcApplier::new(session)
        .apply(&vm, &job.baseline, masks, cancel)
        .await?;
    report::write_applied(out, &job.baseline, &job.vm)?;

    Ok(Outcome::Applied {
        vm: job.vm.clone(),
        baseline: job.baseline.clone(),
        task,
    })
}

async fn list<S, W>(
    session: &S,
    cluster: &str,
    cancel: &CancelSignal,
    out: &mut W,
) -> Result<Outcome, EvcError>
where
    S: Inventory + PropertyCollector,
    W: Write + ?Sized,
{
    let cluster = guarded(
        cancel,
        Step::ResolveCluster,
        InventoryResolver::new(session).resolve_cluster(cluster),
    )
    .await?;
    let manager = guarded(
        cancel,
        Step::ReadEvcState,
        BaselineMaskResolver::new(session).evc_manager(&cluster),
    )
    .await?;

    report::write_baselines(out, &manager.evc_state)?;
    Ok(Outcome::Listed {
        cluster: cluster.name,
        baselines: manager.evc_state.supported_evc_mode.len(),
    })
}

/// Drive `step_future` unless the cancel signal fires first.
async fn guarded<T, F>(cancel: &CancelSignal, step: Step, step_future: F) -> Result<T, EvcError>
where
    F: Future<Output = Result<T, EvcError>>,
{
    if let Some(reason) = cancel.reason() {
        return Err(EvcError::Cancelled {
            step,
            task: None,
            reason,
        });
    }
    tokio::select! {
        biased;
        reason = cancel.cancelled() => Err(EvcError::Cancelled { step, task: None, reason }),
        result = step_future => result,
    }
}
