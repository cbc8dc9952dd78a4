//! Session configuration.
//!
//! Loaded from an optional TOML file next to the host application's own
//! settings. Every section and field is optional; absent values fall back to
//! the engine defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use vellum_utils::FileSyncPolicy;

use crate::bridge::DEFAULT_DIALOG_TIMEOUT;

/// Raw file shape.
///
/// ```toml
/// [conflict]
/// dialog_timeout_secs = 1200
///
/// [save]
/// file_sync = "skip_sync"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfigFile {
    pub conflict: Option<ConflictConfig>,
    pub save: Option<SaveConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConflictConfig {
    /// Seconds before an unanswered conflict dialog counts as cancelled.
    pub dialog_timeout_secs: Option<u64>,
}

/// Fsync policy for saved files. `skip_sync` trades durability for speed.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    SyncAll,
    SkipSync,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveConfig {
    #[serde(default)]
    pub file_sync: SyncMode,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl SessionConfigFile {
    /// Load a config file. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    /// Apply defaults to the raw file shape.
    #[must_use]
    pub fn resolve(&self) -> SessionConfig {
        let dialog_timeout = self
            .conflict
            .as_ref()
            .and_then(|c| c.dialog_timeout_secs)
            .map_or(DEFAULT_DIALOG_TIMEOUT, Duration::from_secs);
        let file_sync = match self.save.as_ref().map(|s| s.file_sync).unwrap_or_default() {
            SyncMode::SyncAll => FileSyncPolicy::SyncAll,
            SyncMode::SkipSync => FileSyncPolicy::SkipSync,
        };
        SessionConfig {
            dialog_timeout,
            file_sync,
        }
    }
}

/// Fully-resolved engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub dialog_timeout: Duration,
    pub file_sync: FileSyncPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfigFile::default().resolve()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vellum_utils::FileSyncPolicy;

    use super::{ConfigError, SessionConfig, SessionConfigFile, SyncMode};
    use crate::bridge::DEFAULT_DIALOG_TIMEOUT;

    #[test]
    fn empty_config_resolves_to_defaults() {
        let file: SessionConfigFile = toml::from_str("").unwrap();
        let config = file.resolve();
        assert_eq!(config.dialog_timeout, DEFAULT_DIALOG_TIMEOUT);
        assert_eq!(config.file_sync, FileSyncPolicy::SyncAll);
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn parse_conflict_section() {
        let file: SessionConfigFile = toml::from_str(
            r"
[conflict]
dialog_timeout_secs = 90
",
        )
        .unwrap();
        assert_eq!(file.resolve().dialog_timeout, Duration::from_secs(90));
    }

    #[test]
    fn parse_save_section() {
        let file: SessionConfigFile = toml::from_str(
            r#"
[save]
file_sync = "skip_sync"
"#,
        )
        .unwrap();
        assert_eq!(
            file.save.as_ref().unwrap().file_sync,
            SyncMode::SkipSync
        );
        assert_eq!(file.resolve().file_sync, FileSyncPolicy::SkipSync);
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SessionConfigFile::load(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn load_invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "not valid [").unwrap();
        let err = SessionConfigFile::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), &path);
    }

    #[test]
    fn load_round_trips_a_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(
            &path,
            r#"
[conflict]
dialog_timeout_secs = 300

[save]
file_sync = "sync_all"
"#,
        )
        .unwrap();
        let config = SessionConfigFile::load(&path)
            .unwrap()
            .expect("config present")
            .resolve();
        assert_eq!(config.dialog_timeout, Duration::from_secs(300));
        assert_eq!(config.file_sync, FileSyncPolicy::SyncAll);
    }
}
