//! Subcommand handlers and the wiring they share.

pub mod ask;
pub mod chat;
pub mod models;
pub mod monitor;
pub mod settings;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use slothtop_agent::{AgentAssembler, ExecutionPolicy, Session};
use slothtop_config::{RuntimeConfig, SettingsStore};
use slothtop_core::event::EventBus;
use slothtop_core::provider::Provider;
use slothtop_core::tool::ToolRegistry;
use slothtop_monitor::MonitorHub;
use slothtop_tools::{ToolContext, default_registry};

/// Process-wide handles built once from `config.toml`.
pub struct Runtime {
    pub config: RuntimeConfig,
    pub bus: EventBus,
    pub store: Arc<SettingsStore>,
    pub monitors: Arc<MonitorHub>,
}

impl Runtime {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = RuntimeConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        let bus = EventBus::new(64);
        let store = SettingsStore::init(config.settings_path())?.with_events(bus.clone());
        let monitors = Arc::new(MonitorHub::new(
            Duration::from_millis(config.monitor.interval_ms),
            config.monitor.history,
        ));
        Ok(Self {
            config,
            bus,
            store: Arc::new(store),
            monitors,
        })
    }

    pub fn provider(&self) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
        Ok(slothtop_providers::build_from_config(&self.config.backend)?)
    }

    pub fn tools(&self) -> Result<ToolRegistry, Box<dyn std::error::Error>> {
        let http = slothtop_providers::http_client(self.config.backend.timeout_secs)?;
        let ctx = ToolContext::new(http, Arc::clone(&self.monitors), self.config.tools.clone())
            .with_timeout(Duration::from_secs(self.config.agent.tool_timeout_secs));
        Ok(default_registry(&ctx)?)
    }

    /// Open a chat session on `provider`.
    pub async fn open_session(&self, provider: Arc<dyn Provider>) -> Result<Session, Box<dyn std::error::Error>> {
        let assembler = AgentAssembler::new(provider, ExecutionPolicy::from(&self.config.agent))
            .with_events(self.bus.clone());
        let tools = Arc::new(self.tools()?);
        Ok(Session::open(Arc::clone(&self.store), assembler, tools, &self.bus).await?)
    }
}
