//! vim25 collaborators for evc-apply.
//!
//! The workflow talks to the management endpoint only through the traits
//! defined here: [`Connector`] establishes a session, and the session
//! implements [`Inventory`], [`PropertyCollector`] and [`TaskService`].
//! [`client::VimClient`] is the HTTPS implementation over the vim25 JSON
//! binding; tests substitute in-memory ones.

use std::fmt;

use async_trait::async_trait;
use url::Url;

use crate::cancel::CancelSignal;
use crate::error::ApiError;
use crate::evc::apply::ApplyRequest;
use crate::protocol::{ClusterEvcManager, EntityKind, ManagedObjectRef, NamedRef};

pub mod client;
pub mod task;

// ---------------------------------------------------------------------------
// Shared types used across submodules
// ---------------------------------------------------------------------------

/// Login principal and secret. The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Normalised endpoint, e.g. `https://vc.example.com/sdk`.
    pub endpoint: Url,
    pub credentials: Credentials,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Inventory + PropertyCollector + TaskService;

    async fn connect(&self, target: &ConnectionTarget) -> Result<Self::Session, ApiError>;
}

/// Read-only name lookups.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Root of the inventory tree.
    fn root_folder(&self) -> ManagedObjectRef;

    /// Resolve an absolute inventory path such as `/DC1/vm/web-01`.
    async fn find_by_path(&self, path: &str) -> Result<Option<ManagedObjectRef>, ApiError>;

    /// Every entity of `kind` beneath `scope` (recursively), with its name.
    async fn list_named(
        &self,
        scope: &ManagedObjectRef,
        kind: EntityKind,
    ) -> Result<Vec<NamedRef>, ApiError>;
}

#[async_trait]
pub trait PropertyCollector: Send + Sync {
    /// The EVC manager attached to a cluster, if it has one.
    async fn evc_manager(
        &self,
        cluster: &ManagedObjectRef,
    ) -> Result<Option<ManagedObjectRef>, ApiError>;

    /// Full snapshot of a `ClusterEVCManager`.
    async fn retrieve_evc_manager(
        &self,
        manager: &ManagedObjectRef,
    ) -> Result<ClusterEvcManager, ApiError>;
}

/// Terminal state of a server-side task as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed { reason: String },
    /// The caller stopped waiting; the task itself may still be running.
    Cancelled(crate::cancel::CancelReason),
}

#[async_trait]
pub trait TaskService: Send + Sync {
    /// Submit `ApplyEvcModeVM_Task`; returns the task reference.
    async fn apply_evc_mode(&self, request: &ApplyRequest) -> Result<ManagedObjectRef, ApiError>;

    /// Block until `task` is terminal or `cancel` fires.
    async fn wait(
        &self,
        task: &ManagedObjectRef,
        cancel: &CancelSignal,
    ) -> Result<TaskOutcome, ApiError>;
}

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use client::{ConnectionSettings, VimClient, VimConnector};
pub use task::PollPolicy;
