//! Disk usage per mounted device.

use async_trait::async_trait;
use slothtop_core::error::ToolError;
use slothtop_core::tool::{Tool, ToolParam, ToolResult};
use std::collections::BTreeMap;
use tokio::process::Command;

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DiskSpace {
    pub total: f64,
    pub used: f64,
    pub free: f64,
}

impl DiskSpace {
    fn from_bytes(total: u64, used: u64, free: u64) -> Self {
        let gb = |b: u64| (b as f64 / GB * 100.0).round() / 100.0;
        Self {
            total: gb(total),
            used: gb(used),
            free: gb(free),
        }
    }
}

/// Parse POSIX `df -kP` output, keeping only real block devices.
pub fn parse_df(output: &str) -> BTreeMap<String, DiskSpace> {
    let mut disks = BTreeMap::new();
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 || !fields[0].starts_with("/dev/") {
            continue;
        }
        let kb = |i: usize| fields[i].parse::<u64>().ok().map(|v| v * 1024);
        if let (Some(total), Some(used), Some(free)) = (kb(1), kb(2), kb(3)) {
            // same device mounted twice (bind mounts, snaps)
            disks
                .entry(fields[0].to_string())
                .or_insert_with(|| DiskSpace::from_bytes(total, used, free));
        }
    }
    disks
}

/// Parse `Name,Used,Free` CSV lines from PowerShell's `Get-PSDrive`.
pub fn parse_psdrive(output: &str) -> BTreeMap<String, DiskSpace> {
    let mut disks = BTreeMap::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.trim().trim_matches('"').split("\",\"").collect();
        if fields.len() != 3 {
            continue;
        }
        if let (Ok(used), Ok(free)) = (fields[1].parse::<u64>(), fields[2].parse::<u64>()) {
            disks.insert(format!("{}:\\", fields[0]), DiskSpace::from_bytes(used + free, used, free));
        }
    }
    disks
}

pub struct DiskUsageTool;

#[async_trait]
impl Tool for DiskUsageTool {
    fn name(&self) -> &str {
        "disk_usage"
    }

    fn description(&self) -> &str {
        "Get total, used, and free space (in GB) for each disk on this computer."
    }

    fn params(&self) -> Vec<ToolParam> {
        Vec::new()
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let output = if cfg!(target_os = "windows") {
            Command::new("powershell")
                .args([
                    "-NoProfile",
                    "-Command",
                    "Get-PSDrive -PSProvider FileSystem | Select-Object Name,Used,Free | ConvertTo-Csv -NoTypeInformation",
                ])
                .output()
                .await
        } else {
            Command::new("df").arg("-kP").output().await
        }
        .map_err(|e| ToolError::failed("disk_usage", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let disks = if cfg!(target_os = "windows") {
            parse_psdrive(&stdout)
        } else {
            parse_df(&stdout)
        };

        if disks.is_empty() {
            return Err(ToolError::failed("disk_usage", "no disks found"));
        }

        let data = serde_json::to_value(&disks).unwrap_or_default();
        Ok(ToolResult::ok(serde_json::to_string_pretty(&data).unwrap_or_default()).with_data(data))
    }
}
