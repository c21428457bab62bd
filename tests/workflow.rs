//! End-to-end workflow tests against in-memory collaborators.
//!
//! Each test drives `workflow::run` the way the binary does and checks three
//! things: the returned outcome or error kind, the operator output, and what
//! (if anything) reached the apply endpoint.

mod common;

use std::time::Duration;

use common::{MockConnector, TASK_ID, TaskScript, World, evc_mode, settings};
use evc_apply::cancel::{self, CancelReason, CancelSignal};
use evc_apply::config::{Mode, Settings};
use evc_apply::error::{ConfigError, EvcError, Step};
use evc_apply::protocol::FeatureMask;
use evc_apply::workflow::{self, Outcome};

async fn run(settings: &Settings, connector: &MockConnector) -> (Result<Outcome, EvcError>, String) {
    run_with(settings, connector, &CancelSignal::never()).await
}

async fn run_with(
    settings: &Settings,
    connector: &MockConnector,
    cancel: &CancelSignal,
) -> (Result<Outcome, EvcError>, String) {
    let mut out = Vec::new();
    let result = workflow::run(settings, connector, cancel, &mut out).await;
    (result, String::from_utf8(out).unwrap())
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn applies_resolved_masks_and_reports_success() {
    let connector = MockConnector::new(World::standard());
    let (result, out) = run(&settings(), &connector).await;

    let outcome = result.unwrap();
    assert!(matches!(
        outcome,
        Outcome::Applied { ref task, .. } if task.value == TASK_ID
    ));
    assert_eq!(
        out,
        "mask key=\"f1\" feature_name=\"cpuid.AES\" value=\"1\"\n\
         mask key=\"f2\" feature_name=\"cpuid.AVX\" value=\"0\"\n\
         Applying EVC mode intel-sandybridge to web-01\n\
         EVC mode intel-sandybridge applied to web-01\n"
    );

    let applied = connector.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].vm().value, "vm-10");
    assert_eq!(applied[0].masks(), common::sandybridge_masks().as_slice());
    assert!(applied[0].complete_masks());
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn mask_order_and_duplicates_reach_the_request_untouched() {
    let masks = vec![
        FeatureMask::new("f9", "cpuid.SSE42", "1"),
        FeatureMask::new("f1", "cpuid.AES", "1"),
        FeatureMask::new("f9", "cpuid.SSE42", "1"),
        FeatureMask::new("f3", "cpuid.AVX2", "0"),
    ];
    let mut world = World::standard();
    world.evc_state.supported_evc_mode = vec![
        evc_mode("intel-westmere", vec![FeatureMask::new("w", "cpuid.W", "1")]),
        evc_mode("intel-sandybridge", masks.clone()),
        evc_mode("intel-sandybridge", vec![FeatureMask::new("late", "late", "1")]),
    ];
    let connector = MockConnector::new(world);

    let (result, out) = run(&settings(), &connector).await;
    result.unwrap();

    assert_eq!(connector.applied()[0].masks(), masks.as_slice());
    let printed: Vec<_> = out.lines().filter(|l| l.starts_with("mask ")).collect();
    assert_eq!(printed.len(), 4);
    assert!(printed[0].contains("\"f9\"") && printed[3].contains("\"f3\""));
}

#[tokio::test]
async fn dry_run_prints_masks_without_submitting() {
    let connector = MockConnector::new(World::standard());
    let mut settings = settings();
    settings.mode = Mode::DryRun;

    let (result, out) = run(&settings, &connector).await;

    assert_eq!(
        result.unwrap(),
        Outcome::DryRun {
            vm: "web-01".into(),
            baseline: "intel-sandybridge".into(),
            masks: 2,
        }
    );
    assert!(out.ends_with("Dry run: EVC mode intel-sandybridge not applied to web-01\n"));
    assert!(!out.contains("Applying"));
    assert!(connector.applied().is_empty());
}

#[tokio::test]
async fn list_uses_the_only_cluster_when_none_is_named() {
    let connector = MockConnector::new(World::standard());
    let settings = Settings {
        cluster: None,
        datacenter: None,
        vm: None,
        mode: Mode::ListBaselines,
        ..settings()
    };

    let (result, out) = run(&settings, &connector).await;

    assert_eq!(
        result.unwrap(),
        Outcome::Listed {
            cluster: "prod".into(),
            baselines: 2,
        }
    );
    assert_eq!(
        out,
        " intel-sandybridge\tintel-sandybridge\t2 masks\n*intel-westmere\tintel-westmere\t1 masks\n"
    );
    assert!(connector.applied().is_empty());
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn any_missing_required_value_fails_before_connecting() {
    type Clear = fn(&mut Settings, Option<String>);
    let fields: [(&str, Clear); 6] = [
        ("--dc", |s, v| s.datacenter = v),
        ("--cluster", |s, v| s.cluster = v),
        ("--vm", |s, v| s.vm = v),
        ("GOVC_URL", |s, v| s.url = v),
        ("GOVC_USERNAME", |s, v| s.username = v),
        ("GOVC_PASSWORD", |s, v| s.password = v),
    ];

    for (name, clear) in fields {
        for blank in [None, Some(String::new())] {
            let connector = MockConnector::new(World::standard());
            let mut settings = settings();
            clear(&mut settings, blank.clone());

            let (result, out) = run(&settings, &connector).await;

            match result {
                Err(EvcError::Configuration(ConfigError::Missing(missing))) => {
                    assert_eq!(missing, [name], "{name} set to {blank:?}");
                }
                other => panic!("{name} set to {blank:?}: unexpected result {other:?}"),
            }
            assert_eq!(connector.connects(), 0);
            assert!(out.is_empty());
        }
    }
}

#[tokio::test]
async fn refused_login_is_a_connection_error() {
    let connector = MockConnector::refusing_login(World::standard());
    let (result, _) = run(&settings(), &connector).await;

    match result.unwrap_err() {
        EvcError::Connection {
            endpoint,
            auth,
            source,
        } => {
            assert_eq!(endpoint, "https://vc.example.com/sdk");
            assert!(auth);
            assert!(source.to_string().contains("incorrect user name or password"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Resolution failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_baseline_names_the_request_and_submits_nothing() {
    let connector = MockConnector::new(World::standard());
    let mut settings = settings();
    settings.baseline = Some("intel-haswell".into());

    let (result, out) = run(&settings, &connector).await;

    let err = result.unwrap_err();
    assert!(matches!(err, EvcError::UnsupportedBaseline { .. }));
    assert!(err.to_string().contains("intel-haswell"));
    assert!(out.is_empty());
    assert!(connector.applied().is_empty());
}

#[tokio::test]
async fn unknown_vm_is_not_found() {
    let connector = MockConnector::new(World::standard());
    let mut settings = settings();
    settings.vm = Some("web-99".into());

    let (result, _) = run(&settings, &connector).await;

    let err = result.unwrap_err();
    assert_eq!(err.step(), Step::ResolveVm);
    assert!(matches!(err, EvcError::NotFound { ref name, .. } if name == "web-99"));
}

#[tokio::test]
async fn cluster_without_evc_is_reported() {
    let mut world = World::standard();
    world.evc_manager = None;
    let connector = MockConnector::new(world);

    let (result, _) = run(&settings(), &connector).await;

    assert!(matches!(result, Err(EvcError::EvcUnavailable { .. })));
    assert!(connector.applied().is_empty());
}

// ---------------------------------------------------------------------------
// Task outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn task_failure_reason_is_propagated_verbatim() {
    let reason = "The virtual machine must be powered off to change its EVC mode.";
    let connector =
        MockConnector::new(World::standard().with_task(TaskScript::Fail(reason.to_string())));

    let (result, out) = run(&settings(), &connector).await;

    let err = result.unwrap_err();
    assert!(matches!(err, EvcError::OperationFailed { ref task, .. } if task == TASK_ID));
    assert!(err.to_string().contains(reason));
    assert!(out.contains("Applying EVC mode intel-sandybridge to web-01\n"));
    assert!(!out.contains("applied to"));
}

#[tokio::test]
async fn refused_submission_is_apply_rejected() {
    let connector = MockConnector::new(
        World::standard().with_task(TaskScript::Reject("VM is powered on".to_string())),
    );

    let (result, _) = run(&settings(), &connector).await;

    let err = result.unwrap_err();
    assert!(matches!(err, EvcError::ApplyRejected { .. }));
    assert!(err.to_string().contains("VM is powered on"));
    assert_eq!(err.step(), Step::SubmitApply);
}

#[tokio::test]
async fn losing_the_task_after_submit_is_reported() {
    let connector = MockConnector::new(World::standard().with_task(TaskScript::LoseTrack));

    let (result, _) = run(&settings(), &connector).await;

    let err = result.unwrap_err();
    assert!(matches!(err, EvcError::TaskUnobservable { ref task, .. } if task == TASK_ID));
    assert_eq!(connector.applied().len(), 1);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_before_start_touches_nothing() {
    let connector = MockConnector::new(World::standard());
    let (trigger, cancel) = cancel::channel();
    trigger.cancel(CancelReason::Interrupted);

    let (result, out) = run_with(&settings(), &connector, &cancel).await;

    match result.unwrap_err() {
        EvcError::Cancelled { step, task, reason } => {
            assert_eq!(step, Step::Connect);
            assert_eq!(task, None);
            assert_eq!(reason, CancelReason::Interrupted);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(connector.connects(), 0);
    assert!(out.is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_during_wait_warns_that_the_task_may_continue() {
    let connector = MockConnector::new(World::standard().with_task(TaskScript::Hang));
    let (trigger, cancel) = cancel::channel();
    trigger.cancel_after(Duration::from_secs(30));

    let (result, out) = run_with(&settings(), &connector, &cancel).await;

    let err = result.unwrap_err();
    match &err {
        EvcError::Cancelled { step, task, reason } => {
            assert_eq!(*step, Step::AwaitTask);
            assert_eq!(task.as_deref(), Some(TASK_ID));
            assert_eq!(*reason, CancelReason::DeadlineElapsed(Duration::from_secs(30)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("unverified"));
    assert_eq!(connector.applied().len(), 1);
    assert!(out.contains("Applying EVC mode"));
}
