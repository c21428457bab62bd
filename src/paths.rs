//! Per-user directories for evc-apply.
//!
//! - Config: `$XDG_CONFIG_HOME/evc-apply/` or `~/.config/evc-apply/`
//! - Logs:   `~/Library/Logs/evc-apply/` on macOS, otherwise
//!   `$XDG_DATA_HOME/evc-apply/logs/` or `~/.local/share/evc-apply/logs/`
//!
//! Nothing is created here; the logging layer creates its own directory.

use std::path::{Path, PathBuf};

const APP_NAME: &str = "evc-apply";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    /// Default location of the TOML config file.
    pub config_file: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    /// Resolve from the process environment. `None` when `HOME` is unset.
    pub fn resolve() -> Option<Self> {
        let home = std::env::var_os("HOME").map(PathBuf::from)?;
        let xdg_config = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
        let xdg_data = std::env::var_os("XDG_DATA_HOME").map(PathBuf::from);
        Some(Self::resolve_from(&home, xdg_config.as_deref(), xdg_data.as_deref()))
    }

    pub fn resolve_from(home: &Path, xdg_config: Option<&Path>, xdg_data: Option<&Path>) -> Self {
        let config_dir = match xdg_config {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(APP_NAME),
            _ => home.join(".config").join(APP_NAME),
        };
        Self {
            config_file: config_dir.join(CONFIG_FILE),
            config_dir,
            log_dir: resolve_log_dir(home, xdg_data),
        }
    }
}

// ---------------------------------------------------------------------------
// Platform-specific path resolution
// ---------------------------------------------------------------------------

#[cfg(target_os = "macos")]
fn resolve_log_dir(home: &Path, _xdg_data: Option<&Path>) -> PathBuf {
    home.join("Library").join("Logs").join(APP_NAME)
}

#[cfg(not(target_os = "macos"))]
fn resolve_log_dir(home: &Path, xdg_data: Option<&Path>) -> PathBuf {
    match xdg_data {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(APP_NAME).join("logs"),
        _ => home.join(".local").join("share").join(APP_NAME).join("logs"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_under_home() {
        let paths = AppPaths::resolve_from(Path::new("/home/op"), None, None);
        assert_eq!(paths.config_dir, PathBuf::from("/home/op/.config/evc-apply"));
        assert_eq!(
            paths.config_file,
            PathBuf::from("/home/op/.config/evc-apply/config.toml")
        );
    }

    #[test]
    fn xdg_config_home_wins() {
        let paths = AppPaths::resolve_from(Path::new("/home/op"), Some(Path::new("/cfg")), None);
        assert_eq!(paths.config_file, PathBuf::from("/cfg/evc-apply/config.toml"));
    }

    #[test]
    fn empty_xdg_value_is_ignored() {
        let paths = AppPaths::resolve_from(Path::new("/home/op"), Some(Path::new("")), None);
        assert_eq!(paths.config_dir, PathBuf::from("/home/op/.config/evc-apply"));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn log_dir_follows_xdg_data_home() {
        let paths = AppPaths::resolve_from(Path::new("/home/op"), None, Some(Path::new("/data")));
        assert_eq!(paths.log_dir, PathBuf::from("/data/evc-apply/logs"));

        let paths = AppPaths::resolve_from(Path::new("/home/op"), None, None);
        assert_eq!(
            paths.log_dir,
            PathBuf::from("/home/op/.local/share/evc-apply/logs")
        );
    }
}
