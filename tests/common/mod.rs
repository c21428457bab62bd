//! In-memory vim collaborators shared by the workflow tests.
//!
//! [`MockConnector`] hands out [`MockSession`]s over one fixed [`World`] and
//! records every connect and every apply request so tests can assert on
//! what reached the "server".

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use evc_apply::cancel::CancelSignal;
use evc_apply::config::{DEFAULT_BASELINE, Settings};
use evc_apply::error::ApiError;
use evc_apply::evc::ApplyRequest;
use evc_apply::protocol::{
    ClusterEvcManager, EntityKind, EvcMode, EvcState, FeatureMask, ManagedObjectRef, MethodFault,
    NamedRef,
};
use evc_apply::vim::{
    ConnectionTarget, Connector, Inventory, PropertyCollector, TaskOutcome, TaskService,
};

pub const TASK_ID: &str = "task-101";

/// How the fake server treats `ApplyEvcModeVM_Task`.
#[derive(Debug, Clone)]
pub enum TaskScript {
    Succeed,
    Fail(String),
    /// Refuse the submission outright.
    Reject(String),
    /// Never finish; the wait only ends through cancellation.
    Hang,
    /// Submission works, polling breaks.
    LoseTrack,
}

#[derive(Debug, Clone)]
pub struct World {
    pub datacenters: Vec<NamedRef>,
    /// (datacenter moid, VM)
    pub vms: Vec<(String, NamedRef)>,
    pub clusters: Vec<NamedRef>,
    pub evc_manager: Option<ManagedObjectRef>,
    pub evc_state: EvcState,
    pub task: TaskScript,
}

pub fn named(kind: EntityKind, value: &str, name: &str) -> NamedRef {
    NamedRef {
        reference: ManagedObjectRef::new(kind.type_name(), value),
        name: name.to_string(),
    }
}

pub fn sandybridge_masks() -> Vec<FeatureMask> {
    vec![
        FeatureMask::new("f1", "cpuid.AES", "1"),
        FeatureMask::new("f2", "cpuid.AVX", "0"),
    ]
}

pub fn evc_mode(key: &str, masks: Vec<FeatureMask>) -> EvcMode {
    EvcMode {
        key: key.to_string(),
        label: key.to_string(),
        summary: String::new(),
        vendor: "intel".to_string(),
        feature_mask: masks,
    }
}

impl World {
    /// DC1 holding `web-01`, one cluster `prod`, and a sandybridge/westmere
    /// baseline table.
    pub fn standard() -> Self {
        Self {
            datacenters: vec![named(EntityKind::Datacenter, "datacenter-1", "DC1")],
            vms: vec![(
                "datacenter-1".to_string(),
                named(EntityKind::VirtualMachine, "vm-10", "web-01"),
            )],
            clusters: vec![named(EntityKind::Cluster, "domain-c7", "prod")],
            evc_manager: Some(ManagedObjectRef::new("ClusterEVCManager", "evc-1")),
            evc_state: EvcState {
                supported_evc_mode: vec![
                    evc_mode("intel-sandybridge", sandybridge_masks()),
                    evc_mode(
                        "intel-westmere",
                        vec![FeatureMask::new("f1", "cpuid.AES", "1")],
                    ),
                ],
                current_evc_mode_key: Some("intel-westmere".to_string()),
            },
            task: TaskScript::Succeed,
        }
    }

    pub fn with_task(mut self, task: TaskScript) -> Self {
        self.task = task;
        self
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

pub struct MockConnector {
    world: World,
    refuse_login: bool,
    connects: AtomicUsize,
    applied: Arc<Mutex<Vec<ApplyRequest>>>,
}

impl MockConnector {
    pub fn new(world: World) -> Self {
        Self {
            world,
            refuse_login: false,
            connects: AtomicUsize::new(0),
            applied: Arc::default(),
        }
    }

    pub fn refusing_login(world: World) -> Self {
        Self {
            refuse_login: true,
            ..Self::new(world)
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn applied(&self) -> Vec<ApplyRequest> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, _target: &ConnectionTarget) -> Result<MockSession, ApiError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_login {
            return Err(ApiError::Fault {
                status: 500,
                fault: MethodFault {
                    type_name: "InvalidLogin".to_string(),
                    message: Some("Cannot complete login due to an incorrect user name or password.".to_string()),
                    ..MethodFault::default()
                },
            });
        }
        Ok(MockSession {
            world: self.world.clone(),
            applied: Arc::clone(&self.applied),
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct MockSession {
    world: World,
    applied: Arc<Mutex<Vec<ApplyRequest>>>,
}

#[async_trait]
impl Inventory for MockSession {
    fn root_folder(&self) -> ManagedObjectRef {
        ManagedObjectRef::new("Folder", "group-d1")
    }

    async fn find_by_path(&self, _path: &str) -> Result<Option<ManagedObjectRef>, ApiError> {
        Ok(None)
    }

    async fn list_named(
        &self,
        scope: &ManagedObjectRef,
        kind: EntityKind,
    ) -> Result<Vec<NamedRef>, ApiError> {
        let found = match kind {
            EntityKind::Datacenter => self.world.datacenters.clone(),
            EntityKind::Cluster => self.world.clusters.clone(),
            EntityKind::VirtualMachine => self
                .world
                .vms
                .iter()
                .filter(|(dc, _)| scope.value == *dc || scope.value == "group-d1")
                .map(|(_, vm)| vm.clone())
                .collect(),
        };
        Ok(found)
    }
}

#[async_trait]
impl PropertyCollector for MockSession {
    async fn evc_manager(
        &self,
        _cluster: &ManagedObjectRef,
    ) -> Result<Option<ManagedObjectRef>, ApiError> {
        Ok(self.world.evc_manager.clone())
    }

    async fn retrieve_evc_manager(
        &self,
        _manager: &ManagedObjectRef,
    ) -> Result<ClusterEvcManager, ApiError> {
        Ok(ClusterEvcManager {
            managed_cluster: None,
            evc_state: self.world.evc_state.clone(),
        })
    }
}

#[async_trait]
impl TaskService for MockSession {
    async fn apply_evc_mode(&self, request: &ApplyRequest) -> Result<ManagedObjectRef, ApiError> {
        self.applied.lock().unwrap().push(request.clone());
        if let TaskScript::Reject(message) = &self.world.task {
            return Err(ApiError::Fault {
                status: 500,
                fault: MethodFault {
                    type_name: "InvalidPowerState".to_string(),
                    message: Some(message.clone()),
                    ..MethodFault::default()
                },
            });
        }
        Ok(ManagedObjectRef::new("Task", TASK_ID))
    }

    async fn wait(
        &self,
        _task: &ManagedObjectRef,
        cancel: &CancelSignal,
    ) -> Result<TaskOutcome, ApiError> {
        match &self.world.task {
            TaskScript::Succeed | TaskScript::Reject(_) => Ok(TaskOutcome::Succeeded),
            TaskScript::Fail(reason) => Ok(TaskOutcome::Failed {
                reason: reason.clone(),
            }),
            TaskScript::Hang => Ok(TaskOutcome::Cancelled(cancel.cancelled().await)),
            TaskScript::LoseTrack => Err(ApiError::Protocol(
                "task info response had no state".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Settings with every required value present.
pub fn settings() -> Settings {
    Settings {
        datacenter: Some("DC1".to_string()),
        cluster: Some("prod".to_string()),
        vm: Some("web-01".to_string()),
        baseline: Some(DEFAULT_BASELINE.to_string()),
        url: Some("vc.example.com".to_string()),
        username: Some("administrator@vsphere.local".to_string()),
        password: Some("secret".to_string()),
        ..Settings::default()
    }
}
