//! Logging initialisation for evc-apply.
//!
//! Diagnostics go to stderr, filtered by `RUST_LOG` (default `warn`). When
//! `EVC_APPLY_LOG=1` is set, structured logs are also written to
//! `evc-apply.log` in the per-user log directory and the default filter
//! widens to `info`.
//!
//! Returns a guard that must be kept alive for the duration of the process
//! so that buffered log lines are flushed on exit.

use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::paths::AppPaths;

const LOG_ENV: &str = "EVC_APPLY_LOG";
const LOG_FILE: &str = "evc-apply.log";

pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialise the global tracing subscriber.
///
/// Call once from `main`, store the returned `LogGuard` in a local variable
/// for the duration of the process.
pub fn init() -> LogGuard {
    let file_guard = if file_logging_enabled(std::env::var(LOG_ENV).ok().as_deref()) {
        let dir = log_dir();
        let _ = std::fs::create_dir_all(&dir);
        let file_appender = tracing_appender::rolling::never(&dir, LOG_FILE);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

        tracing_subscriber::registry()
            .with(filter("info"))
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter("warn"))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();

        None
    };

    LogGuard {
        _file_guard: file_guard,
    }
}

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn file_logging_enabled(value: Option<&str>) -> bool {
    value == Some("1")
}

fn log_dir() -> PathBuf {
    AppPaths::resolve()
        .map(|paths| paths.log_dir)
        .unwrap_or_else(|| std::env::temp_dir().join("evc-apply"))
}
