//! vim25 JSON wire types.
//!
//! Defines the structures exchanged with the vSphere vim25 JSON binding
//! (`/sdk/vim25/<release>/...`). Response types derive `Deserialize` and
//! tolerate missing optional fields; request payloads that carry data
//! objects derive `Serialize`. Fields are named the way the server names
//! them and renamed to snake_case on the Rust side.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Managed object references
// ---------------------------------------------------------------------------

/// Opaque handle naming a server-side inventory object.
///
/// On the wire this is `{"_typeName":"ManagedObjectReference","type":…,"value":…}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ManagedObjectRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn is(&self, kind: EntityKind) -> bool {
        self.kind == kind.type_name()
    }
}

impl Serialize for ManagedObjectRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("ManagedObjectReference", 3)?;
        st.serialize_field("_typeName", "ManagedObjectReference")?;
        st.serialize_field("type", &self.kind)?;
        st.serialize_field("value", &self.value)?;
        st.end()
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Inventory entity types the resolver looks up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Datacenter,
    Cluster,
    VirtualMachine,
}

impl EntityKind {
    /// vim25 managed object type name.
    pub fn type_name(self) -> &'static str {
        match self {
            EntityKind::Datacenter => "Datacenter",
            EntityKind::Cluster => "ClusterComputeResource",
            EntityKind::VirtualMachine => "VirtualMachine",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Datacenter => "datacenter",
            EntityKind::Cluster => "cluster",
            EntityKind::VirtualMachine => "VM",
        })
    }
}

/// A resolved reference together with the display name it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub reference: ManagedObjectRef,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Service content
// ---------------------------------------------------------------------------

/// Subset of `ServiceInstance.content` the client needs.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContent {
    pub root_folder: ManagedObjectRef,
    pub property_collector: ManagedObjectRef,
    pub view_manager: ManagedObjectRef,
    pub search_index: ManagedObjectRef,
    pub session_manager: ManagedObjectRef,
    #[serde(default)]
    pub about: AboutInfo,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AboutInfo {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub api_version: String,
}

// ---------------------------------------------------------------------------
// EVC
// ---------------------------------------------------------------------------

/// One CPU feature flag entry of an EVC baseline (`HostFeatureMask`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMask {
    pub key: String,
    pub feature_name: String,
    pub value: String,
}

impl FeatureMask {
    pub fn new(
        key: impl Into<String>,
        feature_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            feature_name: feature_name.into(),
            value: value.into(),
        }
    }
}

/// A supported EVC baseline (`EVCMode`). `key` is the baseline name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvcMode {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub feature_mask: Vec<FeatureMask>,
}

/// `ClusterEVCManagerEVCState`, trimmed to what baseline resolution reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvcState {
    #[serde(rename = "supportedEVCMode", default)]
    pub supported_evc_mode: Vec<EvcMode>,
    #[serde(rename = "currentEVCModeKey", default)]
    pub current_evc_mode_key: Option<String>,
}

/// Snapshot of a `ClusterEVCManager` object.
#[derive(Debug, Clone, Default)]
pub struct ClusterEvcManager {
    pub managed_cluster: Option<ManagedObjectRef>,
    pub evc_state: EvcState,
}

/// Body of `VirtualMachine.ApplyEvcModeVM_Task`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEvcModeBody<'a> {
    pub mask: Vec<WireFeatureMask<'a>>,
    pub complete_masks: bool,
}

/// A [`FeatureMask`] tagged with its vim type for request bodies.
#[derive(Debug, Serialize)]
pub struct WireFeatureMask<'a> {
    #[serde(rename = "_typeName")]
    pub type_name: &'static str,
    #[serde(flatten)]
    pub mask: &'a FeatureMask,
}

impl<'a> From<&'a FeatureMask> for WireFeatureMask<'a> {
    fn from(mask: &'a FeatureMask) -> Self {
        Self {
            type_name: "HostFeatureMask",
            mask,
        }
    }
}

// ---------------------------------------------------------------------------
// Property collector results
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetrieveResult {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub objects: Vec<ObjectContent>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ObjectContent {
    pub obj: ManagedObjectRef,
    #[serde(default)]
    pub prop_set: Vec<DynamicProperty>,
}

impl ObjectContent {
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.prop_set.iter().find(|p| p.name == name).map(|p| &p.val)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DynamicProperty {
    pub name: String,
    #[serde(default)]
    pub val: serde_json::Value,
}

/// Unwrap a primitive property value.
///
/// Primitives inside `DynamicProperty.val` arrive boxed as
/// `{"_typeName":"string","_value":"…"}`; bare strings are accepted too.
pub fn string_value(val: &serde_json::Value) -> Option<&str> {
    val.as_str()
        .or_else(|| val.get("_value").and_then(|v| v.as_str()))
}

// ---------------------------------------------------------------------------
// Tasks and faults
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    #[serde(default)]
    pub key: String,
    pub state: TaskState,
    #[serde(default)]
    pub error: Option<LocalizedMethodFault>,
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub description_id: Option<String>,
    #[serde(default)]
    pub queue_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub complete_time: Option<DateTime<Utc>>,
}

impl TaskInfo {
    /// Server-reported failure text, as close to verbatim as the payload allows.
    pub fn failure_reason(&self) -> String {
        match &self.error {
            Some(err) => err.reason(),
            None => "task reported state \"error\" without fault details".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedMethodFault {
    #[serde(default)]
    pub fault: Option<MethodFault>,
    #[serde(default)]
    pub localized_message: Option<String>,
}

impl LocalizedMethodFault {
    pub fn reason(&self) -> String {
        match (&self.localized_message, &self.fault) {
            (Some(msg), _) if !msg.is_empty() => msg.clone(),
            (_, Some(fault)) => fault.to_string(),
            _ => "unknown fault".to_string(),
        }
    }
}

/// A vim `MethodFault` as returned in error response bodies and task errors.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MethodFault {
    #[serde(rename = "_typeName", default)]
    pub type_name: String,
    #[serde(default)]
    pub fault_message: Vec<LocalizableMessage>,
    #[serde(default)]
    pub message: Option<String>,
}

impl MethodFault {
    fn detail(&self) -> Option<String> {
        if let Some(msg) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return Some(msg.to_string());
        }
        let joined = self
            .fault_message
            .iter()
            .filter_map(|m| m.message.as_deref())
            .collect::<Vec<_>>()
            .join("; ");
        (!joined.is_empty()).then_some(joined)
    }
}

impl fmt::Display for MethodFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_name = if self.type_name.is_empty() {
            "MethodFault"
        } else {
            &self.type_name
        };
        match self.detail() {
            Some(detail) => write!(f, "{type_name}: {detail}"),
            None => f.write_str(type_name),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct LocalizableMessage {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
