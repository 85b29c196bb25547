//! Built-in tool implementations for Slothtop.
//!
//! Each tool is a thin wrapper around one OS or network side effect:
//! launching and closing applications, powering the machine off, looking
//! up the weather, searching the web, reading disk usage, sampling
//! hardware, and searching a markdown notes vault.

pub mod apps;
pub mod disk_usage;
pub mod monitoring;
pub mod multiply;
pub mod power;
pub mod vault_search;
pub mod weather_lookup;
pub mod web_search;

use std::sync::Arc;
use std::time::Duration;

use slothtop_config::ToolsConfig;
use slothtop_core::error::ToolError;
use slothtop_core::tool::ToolRegistry;
use slothtop_monitor::MonitorHub;

pub use apps::{AppControl, SystemApps};

/// Shared handles the built-in tools need.
#[derive(Clone)]
pub struct ToolContext {
    pub http: reqwest::Client,
    pub monitors: Arc<MonitorHub>,
    pub apps: Arc<dyn AppControl>,
    pub config: ToolsConfig,
    pub timeout: Duration,
}

impl ToolContext {
    pub fn new(http: reqwest::Client, monitors: Arc<MonitorHub>, config: ToolsConfig) -> Self {
        Self {
            http,
            monitors,
            apps: Arc::new(SystemApps),
            config,
            timeout: slothtop_core::tool::DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Bound each tool invocation by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a different application launcher.
    pub fn with_apps(mut self, apps: Arc<dyn AppControl>) -> Self {
        self.apps = apps;
        self
    }
}

/// Create the registry of built-in tools, in the order they are presented
/// to the model. `vault_search` is only registered when a vault is configured.
pub fn default_registry(ctx: &ToolContext) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new().with_timeout(ctx.timeout);
    let delay = ctx.config.power_delay_secs;

    registry.register(Arc::new(apps::OpenAppTool::new(Arc::clone(&ctx.apps))))?;
    registry.register(Arc::new(apps::CloseAppTool::new(Arc::clone(&ctx.apps))))?;
    registry.register(Arc::new(power::PowerTool::shutdown(delay)))?;
    registry.register(Arc::new(power::PowerTool::restart(delay)))?;
    registry.register(Arc::new(multiply::MultiplyTool))?;
    registry.register(Arc::new(web_search::WebSearchTool::new(
        ctx.http.clone(),
        &ctx.config.search_url,
    )))?;
    registry.register(Arc::new(weather_lookup::WeatherLookupTool::new(
        ctx.http.clone(),
        &ctx.config.weather_url,
    )))?;
    registry.register(Arc::new(disk_usage::DiskUsageTool))?;
    registry.register(Arc::new(monitoring::StartMonitoringTool::new(Arc::clone(&ctx.monitors))))?;
    registry.register(Arc::new(monitoring::StopMonitoringTool::new(Arc::clone(&ctx.monitors))))?;
    registry.register(Arc::new(monitoring::HardwareStatusTool::new(Arc::clone(&ctx.monitors))))?;
    if let Some(vault) = &ctx.config.vault_path {
        registry.register(Arc::new(vault_search::VaultSearchTool::new(vault.clone())))?;
    }
    Ok(registry)
}
