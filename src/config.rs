//! Invocation settings for evc-apply.
//!
//! Values arrive from three places, highest precedence first: command-line
//! flags (which also read `GOVC_*` environment variables), the optional
//! TOML file, and built-in defaults. [`Settings::validate`] turns them into
//! an [`Invocation`] or reports every missing value at once.
//!
//! ```toml
//! [connection]
//! insecure = false
//! api_release = "8.0.1.0"
//! connect_timeout_secs = 10
//! request_timeout_secs = 60
//!
//! [task]
//! poll_initial_ms = 500
//! poll_max_ms = 5000
//! timeout_secs = 600
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ConfigError;
use crate::paths::AppPaths;
use crate::vim::{ConnectionSettings, ConnectionTarget, Credentials, PollPolicy};

pub const DEFAULT_BASELINE: &str = "intel-sandybridge";

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub connection: ConnectionConfig,
    pub task: TaskConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub insecure: bool,
    pub api_release: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let defaults = ConnectionSettings::default();
        Self {
            insecure: defaults.insecure,
            api_release: defaults.api_release,
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    /// Overall deadline for the run; unset or zero means none.
    pub timeout_secs: Option<u64>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        let defaults = PollPolicy::default();
        Self {
            poll_initial_ms: defaults.initial.as_millis() as u64,
            poll_max_ms: defaults.max.as_millis() as u64,
            timeout_secs: None,
        }
    }
}

impl FileConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load `explicit`, or the default per-user file if none is given.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path, true),
            None => match AppPaths::resolve() {
                Some(paths) => Self::load_from(&paths.config_file, false),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn load_from(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Resolve, print and apply.
    #[default]
    Apply,
    /// Resolve and print, but submit nothing.
    DryRun,
    /// Print the cluster's supported baselines.
    ListBaselines,
}

/// Unvalidated settings as gathered from flags, environment and file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub datacenter: Option<String>,
    pub cluster: Option<String>,
    pub vm: Option<String>,
    pub baseline: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: bool,
    pub timeout_secs: Option<u64>,
    pub mode: Mode,
    pub file: FileConfig,
}

/// What to do, once every required value is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Apply(ApplyJob),
    /// An empty cluster name selects the inventory's only cluster.
    ListBaselines { cluster: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyJob {
    pub datacenter: String,
    pub cluster: String,
    pub vm: String,
    pub baseline: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub target: ConnectionTarget,
    pub job: Job,
}

impl Settings {
    pub fn connection_settings(&self) -> ConnectionSettings {
        let file = &self.file.connection;
        ConnectionSettings {
            insecure: self.insecure || file.insecure,
            api_release: file.api_release.clone(),
            connect_timeout: Duration::from_secs(file.connect_timeout_secs),
            request_timeout: Duration::from_secs(file.request_timeout_secs),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        let task = &self.file.task;
        let initial = Duration::from_millis(task.poll_initial_ms.max(1));
        PollPolicy {
            initial,
            max: Duration::from_millis(task.poll_max_ms).max(initial),
        }
    }

    /// Overall deadline, flag first, then file. Zero disables it.
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout_secs
            .or(self.file.task.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Check that every required value is present.
    ///
    /// All missing values are reported together, named the way the operator
    /// supplies them. Credentials embedded in the URL fill in a missing
    /// username or password.
    pub fn validate(&self) -> Result<Invocation, ConfigError> {
        let endpoint = present(&self.url).map(parse_endpoint).transpose()?;
        let (url_user, url_password) = match &endpoint {
            Some(parsed) => (parsed.username.clone(), parsed.password.clone()),
            None => (None, None),
        };
        let username = present(&self.username).map(str::to_string).or(url_user);
        let password = present(&self.password).map(str::to_string).or(url_password);

        let listing = self.mode == Mode::ListBaselines;
        let mut missing = Vec::new();
        if !listing {
            if present(&self.datacenter).is_none() {
                missing.push("--dc");
            }
            if present(&self.cluster).is_none() {
                missing.push("--cluster");
            }
            if present(&self.vm).is_none() {
                missing.push("--vm");
            }
            if present(&self.baseline).is_none() {
                missing.push("--evcmode");
            }
        }
        if endpoint.is_none() {
            missing.push("GOVC_URL");
        }
        if username.is_none() {
            missing.push("GOVC_USERNAME");
        }
        if password.is_none() {
            missing.push("GOVC_PASSWORD");
        }

        let (Some(endpoint), Some(username), Some(password)) = (endpoint, username, password)
        else {
            return Err(ConfigError::Missing(missing));
        };
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let target = ConnectionTarget {
            endpoint: endpoint.url,
            credentials: Credentials::new(username, password),
        };
        let job = if listing {
            Job::ListBaselines {
                cluster: present(&self.cluster).unwrap_or_default().to_string(),
            }
        } else {
            Job::Apply(ApplyJob {
                datacenter: owned(&self.datacenter),
                cluster: owned(&self.cluster),
                vm: owned(&self.vm),
                baseline: owned(&self.baseline),
                dry_run: self.mode == Mode::DryRun,
            })
        };
        Ok(Invocation { target, job })
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn owned(value: &Option<String>) -> String {
    present(value).unwrap_or_default().to_string()
}

// ---------------------------------------------------------------------------
// Endpoint normalisation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEndpoint {
    /// Endpoint with any userinfo removed.
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Accept `host`, `host:port`, `https://host` or a full `/sdk` URL.
///
/// A missing scheme becomes `https`, an empty path becomes `/sdk`.
pub fn parse_endpoint(raw: &str) -> Result<ParsedEndpoint, ConfigError> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let mut url = Url::parse(&with_scheme).map_err(|source| ConfigError::Endpoint {
        value: raw.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(ConfigError::EndpointScheme {
            value: raw.to_string(),
        });
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/sdk");
    }

    let username = Some(url.username())
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    let password = url.password().map(str::to_string);
    // Infallible for http(s) URLs with a host.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    Ok(ParsedEndpoint {
        url,
        username,
        password,
    })
}
