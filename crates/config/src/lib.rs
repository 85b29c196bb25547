//! Configuration loading, validation, and persistence for Slothtop.
//!
//! Two files live under `~/.slothtop/`:
//!
//! - `settings.json`: the user-editable agent settings ([`settings`]),
//!   mutated live from the front-end and persisted atomically.
//! - `config.toml`: process-level runtime configuration ([`runtime`]):
//!   which backend to talk to, loop limits, monitor cadence, tool options.

pub mod runtime;
pub mod settings;

pub use runtime::{AgentPolicyConfig, BackendConfig, BackendKind, MonitorConfig, RuntimeConfig, ToolsConfig};
pub use settings::{AgentSettings, SettingField, SettingsDocument, SettingsStore};

use std::path::PathBuf;

/// The Slothtop home directory (`$SLOTHTOP_HOME`, else `~/.slothtop`).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SLOTHTOP_HOME") {
        return PathBuf::from(dir);
    }
    dirs_home().join(".slothtop")
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found at {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown setting: {0}")]
    UnknownField(String),
}
