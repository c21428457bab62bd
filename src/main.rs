//! evc-apply: apply an Enhanced vMotion Compatibility baseline to a VM.
//!
//! Looks the baseline up in the cluster's supported EVC modes, prints every
//! feature mask it resolves to, then applies the masks to the VM and waits
//! for the vCenter task to finish.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use evc_apply::cancel::{self, CancelReason};
use evc_apply::config::{DEFAULT_BASELINE, FileConfig, Mode, Settings};
use evc_apply::error::{ConfigError, EvcError};
use evc_apply::logging;
use evc_apply::vim::VimConnector;
use evc_apply::workflow::{self, Outcome};

/// Apply an EVC mode to a virtual machine
#[derive(Parser, Debug)]
#[command(name = "evc-apply", version, about = "Apply an EVC baseline to a vSphere VM")]
struct Args {
    /// Datacenter name, or an absolute inventory path
    #[arg(long)]
    dc: Option<String>,

    /// Cluster whose supported EVC modes define the baseline
    #[arg(long)]
    cluster: Option<String>,

    /// VM name, or a path below the datacenter's vm folder
    #[arg(long)]
    vm: Option<String>,

    /// EVC baseline key
    #[arg(long, default_value = DEFAULT_BASELINE)]
    evcmode: String,

    /// vCenter endpoint (host, host:port or URL)
    #[arg(long, env = "GOVC_URL")]
    url: Option<String>,

    #[arg(long, env = "GOVC_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "GOVC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "GOVC_INSECURE")]
    insecure: bool,

    /// Resolve and print the masks without applying them
    #[arg(long)]
    dry_run: bool,

    /// List the cluster's supported EVC modes and exit
    #[arg(long, conflicts_with = "dry_run")]
    list: bool,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Config file (default: ~/.config/evc-apply/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn into_settings(self) -> Result<Settings, ConfigError> {
        let file = FileConfig::load(self.config.as_deref())?;
        let mode = if self.list {
            Mode::ListBaselines
        } else if self.dry_run {
            Mode::DryRun
        } else {
            Mode::Apply
        };
        Ok(Settings {
            datacenter: self.dc,
            cluster: self.cluster,
            vm: self.vm,
            baseline: Some(self.evcmode),
            url: self.url,
            username: self.username,
            password: self.password,
            insecure: self.insecure,
            timeout_secs: self.timeout,
            mode,
            file,
        })
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let _log_guard = logging::init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create Tokio runtime")?;

    let result = runtime.block_on(run(args));
    runtime.shutdown_timeout(Duration::from_secs(1));

    match result {
        Ok(outcome) => {
            debug!(?outcome, "finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(args: Args) -> Result<Outcome, EvcError> {
    let settings = args.into_settings()?;

    let (trigger, cancel) = cancel::channel();
    let interrupt = trigger.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            interrupt.cancel(CancelReason::Interrupted);
        }
    });
    if let Some(deadline) = settings.deadline() {
        trigger.cancel_after(deadline);
    }

    let connector = VimConnector::new(settings.connection_settings(), settings.poll_policy());
    let mut out = std::io::stdout();
    workflow::run(&settings, &connector, &cancel, &mut out).await
}
