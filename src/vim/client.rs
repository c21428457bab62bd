//! HTTPS client for the vSphere vim25 JSON binding.
//!
//! Every call maps onto `<origin>/sdk/vim25/<release>/<Type>/<moid>/<method>`:
//! methods are `POST` with a JSON body, properties are `GET`. The session id
//! obtained at login travels in the `vmware-api-session-id` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::cancel::CancelSignal;
use crate::error::ApiError;
use crate::evc::apply::ApplyRequest;
use crate::protocol::{
    ClusterEvcManager, EntityKind, EvcState, ManagedObjectRef, MethodFault, NamedRef,
    RetrieveResult, ServiceContent, TaskInfo, string_value,
};
use crate::vim::task::{PollPolicy, TaskInfoSource, wait_for_task};
use crate::vim::{
    ConnectionTarget, Connector, Inventory, PropertyCollector, TaskOutcome, TaskService,
};

const SESSION_HEADER: &str = "vmware-api-session-id";

/// Transport settings for [`VimConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// vim25 release segment of the API path, e.g. `8.0.1.0`.
    pub api_release: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            insecure: false,
            api_release: "8.0.1.0".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct VimConnector {
    settings: ConnectionSettings,
    poll: PollPolicy,
}

impl VimConnector {
    pub fn new(settings: ConnectionSettings, poll: PollPolicy) -> Self {
        Self { settings, poll }
    }
}

#[async_trait]
impl Connector for VimConnector {
    type Session = VimClient;

    async fn connect(&self, target: &ConnectionTarget) -> Result<VimClient, ApiError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.settings.insecure)
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .build()?;
        let base = api_base(&target.endpoint, &self.settings.api_release);

        let resp = http
            .get(endpoint_url(&base, &["ServiceInstance", "ServiceInstance", "content"]))
            .send()
            .await?;
        let content: ServiceContent = read_json(resp, "service content")
            .await?
            .ok_or_else(|| ApiError::Protocol("empty service content".to_string()))?;
        debug!(
            product = %content.about.full_name,
            api_version = %content.about.api_version,
            "retrieved service content"
        );

        let login = endpoint_url(
            &base,
            &[
                content.session_manager.kind.as_str(),
                content.session_manager.value.as_str(),
                "Login",
            ],
        );
        let resp = http
            .post(login)
            .json(&json!({
                "userName": target.credentials.username,
                "password": target.credentials.password(),
            }))
            .send()
            .await?;
        let session_id = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let _: Option<serde_json::Value> = read_json(resp, "login response").await?;
        let session_id = session_id.ok_or_else(|| {
            ApiError::Protocol(format!("login response carried no {SESSION_HEADER} header"))
        })?;

        info!(
            endpoint = %target.endpoint,
            user = %target.credentials.username,
            "logged in"
        );

        Ok(VimClient {
            http,
            base,
            session_id,
            content,
            poll: self.poll,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// An authenticated vim25 session.
///
/// Dropping the client does not log out; the server expires the session.
pub struct VimClient {
    http: reqwest::Client,
    base: Url,
    session_id: String,
    content: ServiceContent,
    poll: PollPolicy,
}

impl VimClient {
    pub fn service_content(&self) -> &ServiceContent {
        &self.content
    }

    fn url(&self, segments: &[&str]) -> Url {
        endpoint_url(&self.base, segments)
    }

    /// Invoke `method` on `this`. `Ok(None)` when the method returns nothing.
    async fn invoke<B, T>(
        &self,
        this: &ManagedObjectRef,
        method: &str,
        body: &B,
        what: &'static str,
    ) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(&[this.kind.as_str(), this.value.as_str(), method]);
        debug!(%url, "invoking method");
        let resp = self
            .http
            .post(url)
            .header(SESSION_HEADER, &self.session_id)
            .json(body)
            .send()
            .await?;
        read_json(resp, what).await
    }

    async fn property<T: DeserializeOwned>(
        &self,
        this: &ManagedObjectRef,
        name: &str,
        what: &'static str,
    ) -> Result<Option<T>, ApiError> {
        let url = self.url(&[this.kind.as_str(), this.value.as_str(), name]);
        debug!(%url, "reading property");
        let resp = self
            .http
            .get(url)
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await?;
        read_json(resp, what).await
    }

    async fn retrieve(&self, spec: serde_json::Value) -> Result<Option<RetrieveResult>, ApiError> {
        self.invoke(
            &self.content.property_collector,
            "RetrievePropertiesEx",
            &spec,
            "property collector result",
        )
        .await
    }

    async fn continue_retrieve(&self, token: &str) -> Result<Option<RetrieveResult>, ApiError> {
        self.invoke(
            &self.content.property_collector,
            "ContinueRetrievePropertiesEx",
            &json!({ "token": token }),
            "property collector result",
        )
        .await
    }

    async fn names_in_view(
        &self,
        view: &ManagedObjectRef,
        kind: EntityKind,
    ) -> Result<Vec<NamedRef>, ApiError> {
        let spec = json!({
            "specSet": [{
                "_typeName": "PropertyFilterSpec",
                "propSet": [{
                    "_typeName": "PropertySpec",
                    "type": kind.type_name(),
                    "pathSet": ["name"],
                }],
                "objectSet": [{
                    "_typeName": "ObjectSpec",
                    "obj": view,
                    "skip": true,
                    "selectSet": [{
                        "_typeName": "TraversalSpec",
                        "name": "traverseView",
                        "type": "ContainerView",
                        "path": "view",
                        "skip": false,
                    }],
                }],
            }],
            "options": { "_typeName": "RetrieveOptions" },
        });

        let mut found = Vec::new();
        let mut page = self.retrieve(spec).await?;
        while let Some(result) = page {
            for object in result.objects {
                let name = object
                    .property("name")
                    .and_then(string_value)
                    .unwrap_or_default()
                    .to_string();
                found.push(NamedRef {
                    reference: object.obj,
                    name,
                });
            }
            page = match result.token {
                Some(token) => self.continue_retrieve(&token).await?,
                None => None,
            };
        }
        Ok(found)
    }
}

#[async_trait]
impl Inventory for VimClient {
    fn root_folder(&self) -> ManagedObjectRef {
        self.content.root_folder.clone()
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<ManagedObjectRef>, ApiError> {
        self.invoke(
            &self.content.search_index,
            "FindByInventoryPath",
            &json!({ "inventoryPath": path }),
            "inventory path lookup",
        )
        .await
    }

    async fn list_named(
        &self,
        scope: &ManagedObjectRef,
        kind: EntityKind,
    ) -> Result<Vec<NamedRef>, ApiError> {
        let view: ManagedObjectRef = self
            .invoke(
                &self.content.view_manager,
                "CreateContainerView",
                &json!({
                    "container": scope,
                    "type": [kind.type_name()],
                    "recursive": true,
                }),
                "container view",
            )
            .await?
            .ok_or_else(|| ApiError::Protocol("CreateContainerView returned nothing".into()))?;

        let found = self.names_in_view(&view, kind).await;

        let destroyed: Result<Option<serde_json::Value>, _> =
            self.invoke(&view, "DestroyView", &json!({}), "destroy view").await;
        if let Err(e) = destroyed {
            warn!(view = %view, error = %e, "failed to destroy container view");
        }

        let found = found?;
        debug!(scope = %scope, kind = %kind, count = found.len(), "listed inventory");
        Ok(found)
    }
}

#[async_trait]
impl PropertyCollector for VimClient {
    async fn evc_manager(
        &self,
        cluster: &ManagedObjectRef,
    ) -> Result<Option<ManagedObjectRef>, ApiError> {
        let manager: Option<ManagedObjectRef> = self
            .invoke(cluster, "EvcManager", &json!({}), "EVC manager reference")
            .await?;
        match manager {
            Some(m) if m.kind != "ClusterEVCManager" => Err(ApiError::UnexpectedType {
                expected: "ClusterEVCManager",
                got: m.kind,
            }),
            other => Ok(other),
        }
    }

    async fn retrieve_evc_manager(
        &self,
        manager: &ManagedObjectRef,
    ) -> Result<ClusterEvcManager, ApiError> {
        let spec = json!({
            "specSet": [{
                "_typeName": "PropertyFilterSpec",
                "propSet": [{
                    "_typeName": "PropertySpec",
                    "type": manager.kind,
                    "all": true,
                }],
                "objectSet": [{
                    "_typeName": "ObjectSpec",
                    "obj": manager,
                    "skip": false,
                }],
            }],
            "options": { "_typeName": "RetrieveOptions" },
        });

        let object = self
            .retrieve(spec)
            .await?
            .and_then(|r| r.objects.into_iter().find(|o| &o.obj == manager))
            .ok_or_else(|| ApiError::Protocol(format!("no properties returned for {manager}")))?;

        let evc_state = match object.property("evcState") {
            Some(val) => serde_json::from_value::<EvcState>(val.clone()).map_err(|source| {
                ApiError::Decode {
                    what: "EVC state",
                    source,
                }
            })?,
            None => EvcState::default(),
        };
        let managed_cluster = object
            .property("managedCluster")
            .and_then(|val| serde_json::from_value(val.clone()).ok());

        debug!(
            manager = %manager,
            supported = evc_state.supported_evc_mode.len(),
            current = ?evc_state.current_evc_mode_key,
            "retrieved EVC manager"
        );

        Ok(ClusterEvcManager {
            managed_cluster,
            evc_state,
        })
    }
}

#[async_trait]
impl TaskInfoSource for VimClient {
    async fn task_info(&self, task: &ManagedObjectRef) -> Result<TaskInfo, ApiError> {
        self.property(task, "info", "task info")
            .await?
            .ok_or_else(|| ApiError::Protocol(format!("{task} has no info")))
    }
}

#[async_trait]
impl TaskService for VimClient {
    async fn apply_evc_mode(&self, request: &ApplyRequest) -> Result<ManagedObjectRef, ApiError> {
        let task: ManagedObjectRef = self
            .invoke(
                request.vm(),
                "ApplyEvcModeVM_Task",
                &request.body(),
                "task reference",
            )
            .await?
            .ok_or_else(|| ApiError::Protocol("ApplyEvcModeVM_Task returned no task".into()))?;
        if task.kind != "Task" {
            return Err(ApiError::UnexpectedType {
                expected: "Task",
                got: task.kind,
            });
        }
        Ok(task)
    }

    async fn wait(
        &self,
        task: &ManagedObjectRef,
        cancel: &CancelSignal,
    ) -> Result<TaskOutcome, ApiError> {
        wait_for_task(self, task, &self.poll, cancel).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `https://host/<path>` → `https://host/<path>/vim25/<release>`, without
/// credentials. `<path>` is normally `/sdk`.
fn api_base(endpoint: &Url, release: &str) -> Url {
    let mut base = endpoint.clone();
    base.set_query(None);
    base.set_fragment(None);
    let _ = base.set_username("");
    let _ = base.set_password(None);
    endpoint_url(&base, &["vim25", release])
}

fn endpoint_url(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Decode a response body, mapping non-2xx statuses to [`ApiError::Fault`].
///
/// An empty body or a JSON `null` decodes to `None`.
async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
    what: &'static str,
) -> Result<Option<T>, ApiError> {
    let status = resp.status();
    let body = resp.bytes().await?;

    if !status.is_success() {
        return Err(ApiError::Fault {
            status: status.as_u16(),
            fault: decode_fault(status, &body),
        });
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<Option<T>>(&body).map_err(|source| ApiError::Decode { what, source })
}

fn decode_fault(status: StatusCode, body: &[u8]) -> MethodFault {
    if let Ok(fault) = serde_json::from_slice::<MethodFault>(body) {
        return fault;
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    let message = if text.is_empty() {
        status.canonical_reason().map(str::to_owned)
    } else {
        Some(text)
    };
    MethodFault {
        message,
        ..Default::default()
    }
}
