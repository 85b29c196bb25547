//! Shut down or restart the machine after a delay.

use async_trait::async_trait;
use slothtop_core::error::ToolError;
use slothtop_core::tool::{ParamType, Tool, ToolParam, ToolResult};
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Shutdown,
    Restart,
}

/// The platform command for `action` after `delay_secs`.
///
/// Unix `shutdown` only schedules in whole minutes, so the delay is
/// rounded up there; zero means immediately.
pub fn power_command(action: PowerAction, delay_secs: u64) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "windows") {
        let flag = match action {
            PowerAction::Shutdown => "/s",
            PowerAction::Restart => "/r",
        };
        ("shutdown", vec![flag.into(), "/t".into(), delay_secs.to_string()])
    } else {
        let flag = match action {
            PowerAction::Shutdown => "-h",
            PowerAction::Restart => "-r",
        };
        let when = match delay_secs {
            0 => "now".to_string(),
            s => format!("+{}", s.div_ceil(60)),
        };
        ("shutdown", vec![flag.into(), when])
    }
}

/// Seconds until the platform command actually acts on a request for
/// `delay_secs`.
pub fn effective_delay(delay_secs: u64) -> u64 {
    if cfg!(target_os = "windows") {
        delay_secs
    } else {
        delay_secs.div_ceil(60) * 60
    }
}

/// The confirmation reported back once `action` is scheduled.
pub fn confirmation(action: PowerAction, delay_secs: u64) -> String {
    let verb = match action {
        PowerAction::Shutdown => "Shutting down",
        PowerAction::Restart => "Restarting",
    };
    match effective_delay(delay_secs) {
        0 => format!("{verb} now."),
        1 => format!("{verb} in 1 second."),
        s => format!("{verb} in {s} seconds."),
    }
}

pub struct PowerTool {
    action: PowerAction,
    default_delay: u64,
}

impl PowerTool {
    pub fn shutdown(default_delay: u64) -> Self {
        Self {
            action: PowerAction::Shutdown,
            default_delay,
        }
    }

    pub fn restart(default_delay: u64) -> Self {
        Self {
            action: PowerAction::Restart,
            default_delay,
        }
    }
}

#[async_trait]
impl Tool for PowerTool {
    fn name(&self) -> &str {
        match self.action {
            PowerAction::Shutdown => "shutdown_pc",
            PowerAction::Restart => "restart_pc",
        }
    }

    fn description(&self) -> &str {
        match self.action {
            PowerAction::Shutdown => "Turn off the computer after a delay in seconds.",
            PowerAction::Restart => "Restart the computer after a delay in seconds.",
        }
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::optional(
            "delay_seconds",
            ParamType::Integer,
            "Seconds to wait before acting (default 5)",
        )]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let delay = match arguments.get("delay_seconds") {
            None | Some(serde_json::Value::Null) => self.default_delay,
            Some(v) => v.as_u64().ok_or_else(|| {
                ToolError::InvalidArguments("delay_seconds must be a non-negative integer".into())
            })?,
        };

        let (program, args) = power_command(self.action, delay);
        info!(action = ?self.action, delay, effective = effective_delay(delay), "Scheduling power action");

        let output = Command::new(program)
            .args(&args)
            .output()
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;

        if !output.status.success() {
            return Err(ToolError::failed(
                self.name(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        Ok(ToolResult::ok(confirmation(self.action, delay)))
    }
}
