//! evc-apply: resolve an EVC baseline on a cluster and apply it to one VM.
//!
//! The library holds the whole workflow behind collaborator traits so it can
//! be driven against a real vCenter ([`vim::VimConnector`]) or in-memory
//! substitutes. The `evc-apply` binary is a thin clap front end over
//! [`workflow::run`].

pub mod cancel;
pub mod config;
pub mod error;
pub mod evc;
pub mod logging;
pub mod paths;
pub mod protocol;
pub mod report;
pub mod vim;
pub mod workflow;

pub use cancel::{CancelReason, CancelSignal, CancelTrigger};
pub use config::{Invocation, Job, Mode, Settings};
pub use error::{ApiError, ConfigError, EvcError, Step};
pub use workflow::Outcome;
