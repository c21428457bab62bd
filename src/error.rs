//! Error taxonomy for the EVC workflow.
//!
//! [`EvcError`] is what the workflow surfaces; each variant keeps the step
//! that failed and the collaborator detail as fields so callers can branch on
//! the kind instead of parsing text. [`ApiError`] is what every remote
//! collaborator call returns.

use std::fmt;
use std::path::PathBuf;

use crate::cancel::CancelReason;
use crate::protocol::{EntityKind, MethodFault};

/// Workflow step identifiers, used to tag errors and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Validate,
    Connect,
    ResolveDatacenter,
    ResolveVm,
    ResolveCluster,
    LocateEvcManager,
    ReadEvcState,
    ResolveBaseline,
    SubmitApply,
    AwaitTask,
    WriteOutput,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Validate => "validate settings",
            Step::Connect => "connect",
            Step::ResolveDatacenter => "resolve datacenter",
            Step::ResolveVm => "resolve VM",
            Step::ResolveCluster => "resolve cluster",
            Step::LocateEvcManager => "locate EVC manager",
            Step::ReadEvcState => "read EVC state",
            Step::ResolveBaseline => "resolve EVC baseline",
            Step::SubmitApply => "submit EVC mode",
            Step::AwaitTask => "await EVC task",
            Step::WriteOutput => "write output",
        })
    }
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned HTTP {status}: {fault}")]
    Fault { status: u16, fault: MethodFault },

    #[error("could not decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected a {expected} reference, got {got}")]
    UnexpectedType { expected: &'static str, got: String },

    #[error("{0}")]
    Protocol(String),
}

impl ApiError {
    /// True when the server refused the credentials or the session.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ApiError::Fault { status, fault } => {
                matches!(status, 401 | 403)
                    || matches!(
                        fault.type_name.as_str(),
                        "InvalidLogin" | "NotAuthenticated" | "NoPermission"
                    )
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required parameter(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("cannot read config file {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid endpoint {value:?}: {source}")]
    Endpoint {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid endpoint {value:?}: scheme must be https or http")]
    EndpointScheme { value: String },
}

// ---------------------------------------------------------------------------
// Workflow errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EvcError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// `auth` is set when the server answered but refused the credentials.
    #[error("{} {endpoint}: {source}", connection_failure(.auth))]
    Connection {
        endpoint: String,
        auth: bool,
        #[source]
        source: ApiError,
    },

    #[error("{step}: {kind} {} not found", display_name(.name))]
    NotFound {
        step: Step,
        kind: EntityKind,
        name: String,
    },

    #[error("{step}: {kind} {} is ambiguous ({count} matches)", display_name(.name))]
    Ambiguous {
        step: Step,
        kind: EntityKind,
        name: String,
        count: usize,
    },

    #[error("{step} failed: {source}")]
    Remote {
        step: Step,
        #[source]
        source: ApiError,
    },

    #[error("cluster {cluster:?} has no EVC manager")]
    EvcUnavailable { cluster: String },

    #[error(
        "EVC baseline {baseline:?} is not supported by cluster {cluster:?} (supported: {})",
        display_list(.available)
    )]
    UnsupportedBaseline {
        baseline: String,
        cluster: String,
        available: Vec<String>,
    },

    #[error("EVC baseline {baseline:?} on cluster {cluster:?} defines no feature masks")]
    EmptyBaseline { baseline: String, cluster: String },

    #[error("applying EVC mode {baseline:?} to VM {vm:?} was rejected: {source}")]
    ApplyRejected {
        vm: String,
        baseline: String,
        #[source]
        source: ApiError,
    },

    #[error("task {task} applying EVC mode {baseline:?} to VM {vm:?} failed: {reason}")]
    OperationFailed {
        vm: String,
        baseline: String,
        task: String,
        reason: String,
    },

    #[error(
        "lost track of task {task} after submission: {source}; \
         the EVC mode may or may not have been applied"
    )]
    TaskUnobservable {
        task: String,
        #[source]
        source: ApiError,
    },

    #[error("{}", cancelled_message(.step, .task, .reason))]
    Cancelled {
        step: Step,
        task: Option<String>,
        reason: CancelReason,
    },

    #[error("write output: {0}")]
    Output(#[from] std::io::Error),
}

impl EvcError {
    /// The workflow step this error was raised in.
    pub fn step(&self) -> Step {
        match self {
            EvcError::Configuration(_) => Step::Validate,
            EvcError::Connection { .. } => Step::Connect,
            EvcError::NotFound { step, .. }
            | EvcError::Ambiguous { step, .. }
            | EvcError::Remote { step, .. }
            | EvcError::Cancelled { step, .. } => *step,
            EvcError::EvcUnavailable { .. } => Step::LocateEvcManager,
            EvcError::UnsupportedBaseline { .. } | EvcError::EmptyBaseline { .. } => {
                Step::ResolveBaseline
            }
            EvcError::ApplyRejected { .. } => Step::SubmitApply,
            EvcError::OperationFailed { .. } | EvcError::TaskUnobservable { .. } => {
                Step::AwaitTask
            }
            EvcError::Output(_) => Step::WriteOutput,
        }
    }

    pub(crate) fn remote(step: Step) -> impl FnOnce(ApiError) -> EvcError {
        move |source| EvcError::Remote { step, source }
    }
}

fn connection_failure(auth: &bool) -> &'static str {
    if *auth {
        "login refused by"
    } else {
        "could not connect to"
    }
}

fn display_name(name: &str) -> String {
    if name.is_empty() {
        "<default>".to_string()
    } else {
        format!("{name:?}")
    }
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn cancelled_message(step: &Step, task: &Option<String>, reason: &CancelReason) -> String {
    match task {
        Some(task) => format!(
            "{step} cancelled ({reason}) while task {task} was still running; \
             the server-side operation may continue and its final state is unverified"
        ),
        None => format!("{step} cancelled ({reason}) before the EVC mode was submitted; no changes were made"),
    }
}
