//! Atoll Config - configuration for the Atoll session daemon.
//!
//! A single flat TOML file with every field defaulted, so an absent or
//! empty file produces a working configuration. No process-wide state: the
//! loaded [`Config`] is passed to every component's constructor.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// The underlying TOML error.
        source: toml::de::Error,
    },

    /// `log_level` is not one of trace/debug/info/warn/error.
    #[error("invalid log_level {value:?} (expected trace, debug, info, warn, or error)")]
    InvalidLogLevel {
        /// The rejected value.
        value: String,
    },

    /// A duration field is zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// The offending field.
        field: &'static str,
    },
}

/// Daemon configuration.
///
/// Every field has a production default; see the field docs for the TOML
/// keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding per-session subdirectories with conversation logs.
    pub sessions_root: PathBuf,
    /// Path of the hook endpoint's unix socket.
    pub socket_path: PathBuf,
    /// Path of the frontend endpoint's unix socket.
    pub frontend_socket_path: PathBuf,
    /// Log level: one of trace, debug, info, warn, error.
    pub log_level: String,
    /// Seconds before a pending permission request auto-denies.
    pub approval_timeout_secs: u64,
    /// Per-file modification debounce window, in milliseconds.
    pub debounce_window_ms: u64,
    /// Per-subscriber change bus queue capacity.
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sessions_root: default_sessions_root(),
            socket_path: std::env::temp_dir().join("atoll-hook.sock"),
            frontend_socket_path: std::env::temp_dir().join("atoll-frontend.sock"),
            log_level: "info".to_string(),
            approval_timeout_secs: 300,
            debounce_window_ms: 100,
            bus_capacity: 1024,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// With an explicit `path` the file must exist and parse. Without one,
    /// the default location (`~/.config/atoll/config.toml`) is used if
    /// present, and built-in defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unreadable or malformed files and for
    /// values that fail validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("no config file; using defaults");
                    Self::default()
                },
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {},
            other => {
                return Err(ConfigError::InvalidLogLevel {
                    value: other.to_string(),
                });
            },
        }
        if self.approval_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "approval_timeout_secs",
            });
        }
        if self.debounce_window_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "debounce_window_ms",
            });
        }
        Ok(())
    }

    /// The approval timeout as a [`Duration`].
    #[must_use]
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    /// The debounce window as a [`Duration`].
    #[must_use]
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

/// `~/.claude/sessions`, falling back to a relative path when no home
/// directory can be determined.
fn default_sessions_root() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from(".claude"), |dirs| dirs.home_dir().join(".claude"))
        .join("sessions")
}

/// `~/.config/atoll/config.toml` (platform equivalent).
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "atoll")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
