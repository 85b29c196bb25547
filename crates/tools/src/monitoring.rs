//! Tools that drive the hardware monitors.

use async_trait::async_trait;
use slothtop_core::error::ToolError;
use slothtop_core::tool::{ParamType, Tool, ToolParam, ToolResult};
use slothtop_monitor::{MonitorError, MonitorHub, MonitorKind, Sample};
use std::sync::Arc;

fn kind_param() -> Vec<ToolParam> {
    vec![ToolParam::required("kind", ParamType::String, "Which hardware to monitor: 'cpu' or 'gpu'")]
}

fn parse_kind(arguments: &serde_json::Value) -> Result<MonitorKind, ToolError> {
    arguments["kind"]
        .as_str()
        .unwrap_or_default()
        .parse()
        .map_err(|e: MonitorError| ToolError::InvalidArguments(e.to_string()))
}

pub struct StartMonitoringTool {
    hub: Arc<MonitorHub>,
}

impl StartMonitoringTool {
    pub fn new(hub: Arc<MonitorHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Tool for StartMonitoringTool {
    fn name(&self) -> &str {
        "start_monitoring"
    }

    fn description(&self) -> &str {
        "Start monitoring CPU or GPU usage in the background."
    }

    fn params(&self) -> Vec<ToolParam> {
        kind_param()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let kind = parse_kind(&arguments)?;
        match self.hub.start(kind).await {
            Ok(_) => Ok(ToolResult::ok(format!("Started {kind} monitoring."))),
            // asking twice is not a failure from the model's point of view
            Err(e @ MonitorError::AlreadyRunning(_)) => Ok(ToolResult::ok(format!("{e}."))),
            Err(e) => Err(ToolError::failed("start_monitoring", e)),
        }
    }
}

pub struct StopMonitoringTool {
    hub: Arc<MonitorHub>,
}

impl StopMonitoringTool {
    pub fn new(hub: Arc<MonitorHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Tool for StopMonitoringTool {
    fn name(&self) -> &str {
        "stop_monitoring"
    }

    fn description(&self) -> &str {
        "Stop a running CPU or GPU monitor."
    }

    fn params(&self) -> Vec<ToolParam> {
        kind_param()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let kind = parse_kind(&arguments)?;
        match self.hub.stop(kind).await {
            Ok(()) => Ok(ToolResult::ok(format!("Stopped {kind} monitoring."))),
            Err(e @ MonitorError::NotRunning(_)) => Ok(ToolResult::ok(format!("{e}."))),
            Err(e) => Err(ToolError::failed("stop_monitoring", e)),
        }
    }
}

pub struct HardwareStatusTool {
    hub: Arc<MonitorHub>,
}

impl HardwareStatusTool {
    pub fn new(hub: Arc<MonitorHub>) -> Self {
        Self { hub }
    }
}

/// Per-label mean over a window of samples.
fn averages(history: &[Sample]) -> serde_json::Map<String, serde_json::Value> {
    let mut sums: Vec<(String, f32, usize)> = Vec::new();
    for reading in history.iter().flat_map(|s| &s.readings) {
        match sums.iter_mut().find(|(label, _, _)| *label == reading.label) {
            Some((_, sum, n)) => {
                *sum += reading.value;
                *n += 1;
            }
            None => sums.push((reading.label.clone(), reading.value, 1)),
        }
    }
    sums.into_iter()
        .map(|(label, sum, n)| {
            let mean = (sum / n as f32 * 10.0).round() / 10.0;
            (label, serde_json::json!(mean))
        })
        .collect()
}

#[async_trait]
impl Tool for HardwareStatusTool {
    fn name(&self) -> &str {
        "hardware_status"
    }

    fn description(&self) -> &str {
        "Report current CPU or GPU usage. Includes recent averages when monitoring is running."
    }

    fn params(&self) -> Vec<ToolParam> {
        kind_param()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let kind = parse_kind(&arguments)?;

        let history = self.hub.history(kind).await;
        let (sample, monitoring) = match history.last() {
            Some(latest) => (latest.clone(), true),
            None => (
                self.hub
                    .sample_now(kind)
                    .await
                    .map_err(|e| ToolError::failed("hardware_status", e))?,
                false,
            ),
        };

        let mut data = serde_json::json!({
            "kind": kind,
            "monitoring": monitoring,
            "timestamp": sample.timestamp,
            "readings": sample.readings,
        });
        let mut output = sample.to_string();
        if monitoring {
            let avg = averages(&history);
            output.push_str(&format!(" (average over {} samples: {})", history.len(), serde_json::Value::Object(avg.clone())));
            data["average"] = serde_json::Value::Object(avg);
            data["samples"] = serde_json::json!(history.len());
        }
        Ok(ToolResult::ok(output).with_data(data))
    }
}
