//! Session configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.difftrack/
//!   config.yaml   (optional: defaults apply when absent)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::RepositoryKind;

/// Tunables for a diff session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Only trees of this kind are aggregated and may host the active file.
    pub supported_kind: RepositoryKind,
    /// Reload the active file when its storage reports a change.
    pub watch_active_file: bool,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            supported_kind: RepositoryKind::hg(),
            watch_active_file: true,
            log_filter: "info".to_string(),
        }
    }
}

/// `<home>/.difftrack/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".difftrack").join("config.yaml")
}

/// Load the config under `home`. A missing file yields the defaults.
pub fn load_at(home: &Path) -> Result<SessionConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(SessionConfig::default());
    }
    load_file(&path)
}

/// Load a config from an explicit file path.
pub fn load_file(path: &Path) -> Result<SessionConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(SessionConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SessionConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically save the config: serialize → `.yaml.tmp` sibling → `rename`.
pub fn save_at(home: &Path, config: &SessionConfig) -> Result<(), ConfigError> {
    let path = config_path_at(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp_path = path.with_file_name("config.yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_yields_defaults() {
        let home = TempDir::new().expect("home");
        let config = load_at(home.path()).expect("load");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.supported_kind, RepositoryKind::hg());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let home = TempDir::new().expect("home");
        let path = config_path_at(home.path());
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "supported_kind: git\n").expect("write");

        let config = load_at(home.path()).expect("load");
        assert_eq!(config.supported_kind, RepositoryKind::from("git"));
        assert!(config.watch_active_file);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn save_then_load_keeps_values() {
        let home = TempDir::new().expect("home");
        let config = SessionConfig {
            supported_kind: RepositoryKind::from("snapshot"),
            watch_active_file: false,
            log_filter: "debug".to_string(),
        };
        save_at(home.path(), &config).expect("save");
        assert!(!config_path_at(home.path())
            .with_file_name("config.yaml.tmp")
            .exists());
        assert_eq!(load_at(home.path()).expect("load"), config);
    }

    #[test]
    fn malformed_config_reports_path() {
        let home = TempDir::new().expect("home");
        let path = config_path_at(home.path());
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "watch_active_file: [unclosed").expect("write");

        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }
}
