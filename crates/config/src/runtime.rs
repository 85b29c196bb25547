//! Process-level runtime configuration.
//!
//! Loaded from `~/.slothtop/config.toml` with environment variable
//! overrides. A missing file yields defaults; a malformed one is fatal.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// The root runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Where the agent settings document lives (default: next to config.toml)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub agent: AgentPolicyConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ollama,
    /// Any OpenAI-compatible chat completions endpoint
    #[serde(alias = "openai_compat")]
    OpenAi,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "openai" | "openai_compat" => Ok(BackendKind::OpenAi),
            other => Err(ConfigError::ValidationError(format!("unknown backend kind '{other}'"))),
        }
    }
}

/// Model backend connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_backend_timeout() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_backend_timeout(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Execution policy for the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPolicyConfig {
    /// Hard cap on model rounds per user message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Number of past transcript turns fed back to the model
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,

    /// Feed unparseable actions back as observations instead of failing
    #[serde(default = "default_true")]
    pub recover_parse_errors: bool,
}

fn default_max_iterations() -> u32 {
    5
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_memory_window() -> usize {
    20
}
fn default_true() -> bool {
    true
}

impl Default for AgentPolicyConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout(),
            memory_window: default_memory_window(),
            recover_parse_errors: true,
        }
    }
}

/// Hardware poller cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Samples kept per monitor
    #[serde(default = "default_history")]
    pub history: usize,
}

fn default_interval_ms() -> u64 {
    1000
}
fn default_history() -> usize {
    30
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            history: default_history(),
        }
    }
}

/// Options for individual built-in tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Markdown notes directory searched by `vault_search`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<PathBuf>,

    /// Delay before shutdown/restart takes effect
    #[serde(default = "default_power_delay")]
    pub power_delay_secs: u64,

    #[serde(default = "default_weather_url")]
    pub weather_url: String,

    #[serde(default = "default_search_url")]
    pub search_url: String,
}

fn default_power_delay() -> u64 {
    5
}
fn default_weather_url() -> String {
    "https://wttr.in".into()
}
fn default_search_url() -> String {
    "https://api.duckduckgo.com".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            vault_path: None,
            power_delay_secs: default_power_delay(),
            weather_url: default_weather_url(),
            search_url: default_search_url(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the default path (~/.slothtop/config.toml).
    ///
    /// Environment overrides, highest priority first:
    /// - `SLOTHTOP_BACKEND`: backend kind
    /// - `SLOTHTOP_BACKEND_URL`, then `OLLAMA_HOST`: backend base URL
    /// - `SLOTHTOP_API_KEY`: backend API key
    /// - `SLOTHTOP_SETTINGS`: settings document path
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(kind) = var("SLOTHTOP_BACKEND") {
            self.backend.kind = kind.parse()?;
        }
        if let Some(url) = var("SLOTHTOP_BACKEND_URL").or_else(|| var("OLLAMA_HOST")) {
            self.backend.base_url = normalize_base_url(&url);
        }
        if let Some(key) = var("SLOTHTOP_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Some(path) = var("SLOTHTOP_SETTINGS") {
            self.settings_path = Some(PathBuf::from(path));
        }
        self.validate()
    }

    /// Path of config.toml.
    pub fn config_path() -> PathBuf {
        crate::config_dir().join("config.toml")
    }

    /// Resolved path of the settings document.
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| crate::config_dir().join("settings.json"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError("agent.max_iterations must be >= 1".into()));
        }
        if self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("agent.tool_timeout_secs must be >= 1".into()));
        }
        if self.monitor.interval_ms == 0 || self.monitor.history == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.interval_ms and monitor.history must be > 0".into(),
            ));
        }
        if !self.backend.base_url.starts_with("http://") && !self.backend.base_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "backend.base_url must be an http(s) URL, got '{}'",
                self.backend.base_url
            )));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// `OLLAMA_HOST` is often a bare `host:port`.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend.kind, BackendKind::Ollama);
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.agent.tool_timeout_secs, 30);
        assert_eq!(config.monitor.history, 30);
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = RuntimeConfig::default_toml();
        let parsed: RuntimeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.backend.base_url, "http://localhost:11434");
        assert_eq!(parsed.tools.power_delay_secs, 5);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = RuntimeConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.agent.memory_window, 20);
    }

    #[test]
    fn partial_file_backfills() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[backend]
kind = "openai"
base_url = "https://api.example.com/v1"

[agent]
max_iterations = 3

[tools]
vault_path = "/home/me/notes"
"#,
        )
        .unwrap();

        let config = RuntimeConfig::load_from(&path).unwrap();
        assert_eq!(config.backend.kind, BackendKind::OpenAi);
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.agent.tool_timeout_secs, 30);
        assert_eq!(config.tools.vault_path, Some(PathBuf::from("/home/me/notes")));
    }

    #[test]
    fn zero_iterations_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nmax_iterations = 0\n").unwrap();
        assert!(matches!(
            RuntimeConfig::load_from(&path).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = RuntimeConfig::default();
        config
            .apply_env(|key| match key {
                "OLLAMA_HOST" => Some("10.0.0.5:11434".into()),
                "SLOTHTOP_API_KEY" => Some("sk-test".into()),
                "SLOTHTOP_SETTINGS" => Some("/tmp/s.json".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.backend.base_url, "http://10.0.0.5:11434");
        assert_eq!(config.backend.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.settings_path(), PathBuf::from("/tmp/s.json"));
    }

    #[test]
    fn bad_backend_kind_rejected() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_env(|key| (key == "SLOTHTOP_BACKEND").then(|| "bard".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("bard"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let backend = BackendConfig {
            api_key: Some("sk-secret".into()),
            ..BackendConfig::default()
        };
        let dbg = format!("{backend:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
