//! JSON-backed agent settings.
//!
//! The document keeps two sections, `user_settings` and `default_settings`,
//! each holding `app_settings` and `agent_settings`. A field resolves to the
//! user value, then the default-section value, then the built-in default.
//! Writes only ever touch `user_settings.agent_settings`; every other key in
//! the document, known or not, is carried through untouched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use slothtop_core::event::{DomainEvent, EventBus};
use slothtop_core::provider::SamplingParams;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::ConfigError;

pub const DEFAULT_AGENT_NAME: &str = "Slothtop";
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_PROMPT: &str = "You are a helpful assistant. Use the tools only if it's necessary \
(for example, if the user asks to open an application, you should use tools, but if the user asks \
a general question (for example, how are you), you can answer without using tools).";

/// Fully resolved agent settings. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub name: String,
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        let sampling = SamplingParams::default();
        Self {
            name: DEFAULT_AGENT_NAME.into(),
            prompt: DEFAULT_PROMPT.into(),
            model: DEFAULT_MODEL.into(),
            temperature: sampling.temperature,
            top_k: sampling.top_k,
            top_p: sampling.top_p,
            max_output_tokens: sampling.max_tokens,
        }
    }
}

impl AgentSettings {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            max_tokens: self.max_output_tokens,
        }
    }

    /// Current value of a field as JSON.
    pub fn get(&self, field: SettingField) -> serde_json::Value {
        match field {
            SettingField::Name => self.name.clone().into(),
            SettingField::Prompt => self.prompt.clone().into(),
            SettingField::Model => self.model.clone().into(),
            SettingField::Temperature => f64::from(self.temperature).into(),
            SettingField::TopK => self.top_k.into(),
            SettingField::TopP => f64::from(self.top_p).into(),
            SettingField::MaxOutputTokens => self.max_output_tokens.into(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_unit_range("temperature", self.temperature)?;
        check_unit_range("top_p", self.top_p)?;
        if self.top_k < 1 {
            return Err(ConfigError::ValidationError("top_k must be >= 1".into()));
        }
        if self.max_output_tokens < 1 {
            return Err(ConfigError::ValidationError("max_output_tokens must be >= 1".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        Ok(())
    }
}

fn check_unit_range(name: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// A mutable agent setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingField {
    Name,
    Prompt,
    Model,
    Temperature,
    TopK,
    TopP,
    MaxOutputTokens,
}

impl SettingField {
    pub const ALL: [SettingField; 7] = [
        SettingField::Name,
        SettingField::Prompt,
        SettingField::Model,
        SettingField::Temperature,
        SettingField::TopK,
        SettingField::TopP,
        SettingField::MaxOutputTokens,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingField::Name => "name",
            SettingField::Prompt => "prompt",
            SettingField::Model => "model",
            SettingField::Temperature => "temperature",
            SettingField::TopK => "top_k",
            SettingField::TopP => "top_p",
            SettingField::MaxOutputTokens => "max_output_tokens",
        }
    }

    /// Check `value` against this field's type and range, returning the
    /// normalized value to store.
    fn validate(self, value: serde_json::Value) -> Result<serde_json::Value, ConfigError> {
        let invalid = |expected: &str, got: &serde_json::Value| {
            ConfigError::ValidationError(format!("{} must be {expected}, got {got}", self.as_str()))
        };
        match self {
            SettingField::Name | SettingField::Model => match value.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => Ok(s.into()),
                _ => Err(invalid("a non-empty string", &value)),
            },
            SettingField::Prompt => match value {
                serde_json::Value::String(_) => Ok(value),
                other => Err(invalid("a string", &other)),
            },
            SettingField::Temperature | SettingField::TopP => match value.as_f64() {
                Some(v) if (0.0..=1.0).contains(&v) => Ok(v.into()),
                _ => Err(invalid("a number between 0.0 and 1.0", &value)),
            },
            SettingField::TopK | SettingField::MaxOutputTokens => match value.as_u64() {
                Some(v) if v >= 1 && v <= u64::from(u32::MAX) => Ok(v.into()),
                _ => Err(invalid("an integer >= 1", &value)),
            },
        }
    }

    /// Parse raw user text into the JSON type this field expects.
    fn parse_raw(self, raw: &str) -> Result<serde_json::Value, ConfigError> {
        let raw = raw.trim();
        let bad = || ConfigError::ValidationError(format!("{}: cannot parse '{raw}'", self.as_str()));
        match self {
            SettingField::Name | SettingField::Prompt | SettingField::Model => Ok(raw.into()),
            SettingField::Temperature | SettingField::TopP => {
                raw.parse::<f64>().map(Into::into).map_err(|_| bad())
            }
            SettingField::TopK | SettingField::MaxOutputTokens => {
                raw.parse::<u64>().map(Into::into).map_err(|_| bad())
            }
        }
    }
}

impl FromStr for SettingField {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "name" => Ok(SettingField::Name),
            "prompt" => Ok(SettingField::Prompt),
            "model" | "default_model" => Ok(SettingField::Model),
            "temperature" => Ok(SettingField::Temperature),
            "top_k" => Ok(SettingField::TopK),
            "top_p" => Ok(SettingField::TopP),
            "max_output_tokens" | "num_predict" => Ok(SettingField::MaxOutputTokens),
            other => Err(ConfigError::UnknownField(other.to_string())),
        }
    }
}

impl std::fmt::Display for SettingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- On-disk document ---

/// The settings file as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default)]
    pub user_settings: SettingsSection,

    #[serde(default)]
    pub default_settings: SettingsSection,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsSection {
    #[serde(default)]
    pub app_settings: AppSettings,

    #[serde(default)]
    pub agent_settings: AgentSettingsPatch,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Presentation settings. Carried through writes, never interpreted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Agent settings as they appear in one section: any field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, alias = "default_model", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, alias = "num_predict", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AgentSettingsPatch {
    fn full(s: &AgentSettings) -> Self {
        Self {
            name: Some(s.name.clone()),
            prompt: Some(s.prompt.clone()),
            model: Some(s.model.clone()),
            temperature: Some(s.temperature),
            top_k: Some(s.top_k),
            top_p: Some(s.top_p),
            max_output_tokens: Some(s.max_output_tokens),
            extra: serde_json::Map::new(),
        }
    }

    /// Store an already-validated value.
    fn apply(&mut self, field: SettingField, value: &serde_json::Value) {
        let string = || value.as_str().map(str::to_string);
        let unsigned = || value.as_u64().and_then(|v| u32::try_from(v).ok());
        match field {
            SettingField::Name => self.name = string(),
            SettingField::Prompt => self.prompt = string(),
            SettingField::Model => self.model = string(),
            SettingField::Temperature => self.temperature = value.as_f64().map(|v| v as f32),
            SettingField::TopK => self.top_k = unsigned(),
            SettingField::TopP => self.top_p = value.as_f64().map(|v| v as f32),
            SettingField::MaxOutputTokens => self.max_output_tokens = unsigned(),
        }
    }
}

impl SettingsDocument {
    /// A fresh document with both sections fully populated from built-ins.
    pub fn with_defaults() -> Self {
        let defaults = AgentSettings::default();
        let section = || SettingsSection {
            app_settings: AppSettings {
                theme: Some("dark".into()),
                extra: serde_json::Map::new(),
            },
            agent_settings: AgentSettingsPatch::full(&defaults),
            extra: serde_json::Map::new(),
        };
        Self {
            user_settings: section(),
            default_settings: section(),
            extra: serde_json::Map::new(),
        }
    }

    /// Resolve each field: user section, then default section, then built-in.
    pub fn resolve(&self) -> AgentSettings {
        let user = &self.user_settings.agent_settings;
        let fallback = &self.default_settings.agent_settings;
        let builtin = AgentSettings::default();
        AgentSettings {
            name: user.name.clone().or_else(|| fallback.name.clone()).unwrap_or(builtin.name),
            prompt: user.prompt.clone().or_else(|| fallback.prompt.clone()).unwrap_or(builtin.prompt),
            model: user.model.clone().or_else(|| fallback.model.clone()).unwrap_or(builtin.model),
            temperature: user.temperature.or(fallback.temperature).unwrap_or(builtin.temperature),
            top_k: user.top_k.or(fallback.top_k).unwrap_or(builtin.top_k),
            top_p: user.top_p.or(fallback.top_p).unwrap_or(builtin.top_p),
            max_output_tokens: user
                .max_output_tokens
                .or(fallback.max_output_tokens)
                .unwrap_or(builtin.max_output_tokens),
        }
    }
}

// --- Store ---

/// Load and validate the agent settings at `path`.
///
/// A missing file is an error; a missing field takes its default.
pub fn load(path: &Path) -> Result<AgentSettings, ConfigError> {
    let settings = read_document(path)?.resolve();
    settings.validate()?;
    Ok(settings)
}

fn read_document(path: &Path) -> Result<SettingsDocument, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.to_path_buf())
        } else {
            ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;

    serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a partial one. Returns after the data is on disk.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ConfigError> {
    let write_err = |reason: String| ConfigError::WriteError {
        path: path.to_path_buf(),
        reason,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| write_err(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_err(e.to_string()))?;
    tmp.write_all(contents).map_err(|e| write_err(e.to_string()))?;
    tmp.as_file().sync_all().map_err(|e| write_err(e.to_string()))?;
    tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;

    // Make the rename itself durable.
    #[cfg(unix)]
    if let Ok(d) = std::fs::File::open(dir) {
        let _ = d.sync_all();
    }

    Ok(())
}

/// Reads and writes one settings file.
///
/// Writers are serialized by an internal lock held across the whole
/// read-modify-write, so concurrent `set` calls never lose an update.
pub struct SettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    events: Option<EventBus>,
}

impl SettingsStore {
    /// A store for `path`. Does not touch the filesystem.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            events: None,
        }
    }

    /// Like [`open`](Self::open), but first writes a default document if
    /// nothing exists at `path`.
    pub fn init(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let store = Self::open(path);
        if !store.path.exists() {
            info!(path = %store.path.display(), "Creating default settings file");
            store.write_document(&SettingsDocument::with_defaults())?;
        }
        Ok(store)
    }

    /// Publish `SettingsChanged` on `bus` after every successful write.
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the resolved settings from disk.
    pub fn load(&self) -> Result<AgentSettings, ConfigError> {
        load(&self.path)
    }

    /// The raw document, including sections the agent does not use.
    pub fn document(&self) -> Result<SettingsDocument, ConfigError> {
        read_document(&self.path)
    }

    /// Validate and persist one field. Returns the settings as now stored.
    pub fn set(
        &self,
        field: SettingField,
        value: impl Into<serde_json::Value>,
    ) -> Result<AgentSettings, ConfigError> {
        let value = field.validate(value.into())?;

        let settings = {
            let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut doc = read_document(&self.path)?;
            doc.user_settings.agent_settings.apply(field, &value);
            let settings = doc.resolve();
            settings.validate()?;
            self.write_document(&doc)?;
            settings
        };

        debug!(field = %field, value = %value, "Setting persisted");
        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::SettingsChanged {
                field: field.as_str().to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(settings)
    }

    /// [`set`](Self::set) from user-typed text, e.g. `("top_k", "20")`.
    pub fn set_from_str(&self, field: &str, raw: &str) -> Result<AgentSettings, ConfigError> {
        let field: SettingField = field.parse()?;
        let value = field.parse_raw(raw)?;
        self.set(field, value)
    }

    fn write_document(&self, doc: &SettingsDocument) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(doc).map_err(|e| ConfigError::WriteError {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&self.path, json.as_bytes())
    }
}
