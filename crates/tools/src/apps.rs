//! Open and close desktop applications by display name.

use async_trait::async_trait;
use slothtop_core::error::ToolError;
use slothtop_core::tool::{ParamType, Tool, ToolParam, ToolResult};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Launches and terminates applications.
#[async_trait]
pub trait AppControl: Send + Sync {
    async fn open(&self, app: &str) -> Result<(), String>;

    async fn close(&self, app: &str) -> Result<(), String>;
}

/// Reject names that could smuggle extra arguments into a shell.
pub fn sanitize_app_name(raw: &str) -> Result<String, ToolError> {
    let name = raw.trim().to_lowercase();
    if name.is_empty() {
        return Err(ToolError::InvalidArguments("application name is empty".into()));
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | '+');
    if !name.chars().all(allowed) {
        return Err(ToolError::InvalidArguments(format!(
            "application name '{raw}' contains unsupported characters"
        )));
    }
    Ok(name)
}

/// The platform's own launcher and process tools.
pub struct SystemApps;

#[async_trait]
impl AppControl for SystemApps {
    async fn open(&self, app: &str) -> Result<(), String> {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", "", app]);
            c
        } else if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.args(["-a", app]);
            c
        } else {
            Command::new(app)
        };

        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        match cmd.spawn() {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(format!("{app} not found")),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn close(&self, app: &str) -> Result<(), String> {
        let output = if cfg!(target_os = "windows") {
            let image = if app.ends_with(".exe") {
                app.to_string()
            } else {
                format!("{app}.exe")
            };
            Command::new("taskkill").args(["/IM", &image, "/F"]).output().await
        } else {
            Command::new("pkill").args(["-i", "-f", app]).output().await
        }
        .map_err(|e| e.to_string())?;

        if output.status.success() {
            Ok(())
        } else {
            Err(format!("no running process matched {app}"))
        }
    }
}

pub struct OpenAppTool {
    apps: Arc<dyn AppControl>,
}

impl OpenAppTool {
    pub fn new(apps: Arc<dyn AppControl>) -> Self {
        Self { apps }
    }
}

#[async_trait]
impl Tool for OpenAppTool {
    fn name(&self) -> &str {
        "open_app"
    }

    fn description(&self) -> &str {
        "Open an application on this computer by its name, e.g. 'notepad' or 'firefox'."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required("app_name", ParamType::String, "Name of the application to open")]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let app = sanitize_app_name(arguments["app_name"].as_str().unwrap_or_default())?;
        debug!(app = %app, "Opening application");
        self.apps
            .open(&app)
            .await
            .map_err(|reason| ToolError::failed("open_app", reason))?;
        Ok(ToolResult::ok(format!("Opened {app}.")))
    }
}

pub struct CloseAppTool {
    apps: Arc<dyn AppControl>,
}

impl CloseAppTool {
    pub fn new(apps: Arc<dyn AppControl>) -> Self {
        Self { apps }
    }
}

#[async_trait]
impl Tool for CloseAppTool {
    fn name(&self) -> &str {
        "close_app"
    }

    fn description(&self) -> &str {
        "Close a running application by its name."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required("app_name", ParamType::String, "Name of the application to close")]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let app = sanitize_app_name(arguments["app_name"].as_str().unwrap_or_default())?;
        debug!(app = %app, "Closing application");
        self.apps
            .close(&app)
            .await
            .map_err(|reason| ToolError::failed("close_app", reason))?;
        Ok(ToolResult::ok(format!("Closed {app}.")))
    }
}
