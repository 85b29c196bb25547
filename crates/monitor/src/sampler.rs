//! Hardware counter sources.
//!
//! CPU and memory come from `sysinfo`, which reads each platform's native
//! counters; GPU load and temperature come from `nvidia-smi`. Parsing is
//! kept separate from I/O so it can be checked against captured output.

use async_trait::async_trait;
use sysinfo::System;
use tokio::process::Command;

use crate::{MonitorError, MonitorKind, Reading};

/// Something that can be polled for readings.
#[async_trait]
pub trait Sampler: Send + 'static {
    fn kind(&self) -> MonitorKind;

    async fn sample(&mut self) -> Result<Vec<Reading>, MonitorError>;
}

/// Used-memory percentage, or `None` when the total is unknown.
pub fn memory_percent(used: u64, total: u64) -> Option<f32> {
    if total == 0 {
        return None;
    }
    Some((used.min(total) as f64 / total as f64 * 100.0) as f32)
}

/// CPU load and memory usage from the platform's own counters (`/proc` on
/// Linux, PDH on Windows, host statistics on macOS).
///
/// CPU load is measured since the previous refresh, so the first sample of
/// a fresh sampler reads near zero.
#[derive(Debug)]
pub struct CpuSampler {
    system: System,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self { system: System::new() }
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for CpuSampler {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Cpu
    }

    async fn sample(&mut self) -> Result<Vec<Reading>, MonitorError> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        if self.system.cpus().is_empty() {
            return Err(MonitorError::Unavailable("no CPU counters on this platform".into()));
        }
        let memory = memory_percent(self.system.used_memory(), self.system.total_memory())
            .ok_or_else(|| MonitorError::Unavailable("total memory unknown".into()))?;
        let cpu = self.system.global_cpu_usage().clamp(0.0, 100.0);

        Ok(vec![Reading::percent("cpu", cpu), Reading::percent("memory", memory)])
    }
}

/// Parse `nvidia-smi --query-gpu=utilization.gpu,temperature.gpu
/// --format=csv,noheader,nounits`. Only the first GPU is reported.
pub fn parse_nvidia_smi(output: &str) -> Option<(f32, f32)> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let mut parts = line.split(',').map(str::trim);
    let load = parts.next()?.parse().ok()?;
    let temperature = parts.next()?.parse().ok()?;
    Some((load, temperature))
}

/// GPU load and temperature via `nvidia-smi`.
#[derive(Debug, Default)]
pub struct GpuSampler;

#[async_trait]
impl Sampler for GpuSampler {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Gpu
    }

    async fn sample(&mut self) -> Result<Vec<Reading>, MonitorError> {
        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=utilization.gpu,temperature.gpu",
                "--format=csv,noheader,nounits",
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MonitorError::Unavailable(format!("nvidia-smi: {e}")))?;

        if !output.status.success() {
            return Err(MonitorError::Unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (load, temperature) = parse_nvidia_smi(&stdout)
            .ok_or_else(|| MonitorError::Unavailable("no GPU reported".into()))?;

        Ok(vec![
            Reading::percent("load", load),
            Reading {
                label: "temperature".into(),
                value: temperature,
                unit: "°C".into(),
            },
        ])
    }
}

/// The default sampler for a kind.
pub fn sampler_for(kind: MonitorKind) -> Box<dyn Sampler> {
    match kind {
        MonitorKind::Cpu => Box::new(CpuSampler::new()),
        MonitorKind::Gpu => Box::new(GpuSampler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_percent_of_total() {
        assert!((memory_percent(12_000, 16_000).unwrap() - 75.0).abs() < 1e-4);
        assert_eq!(memory_percent(5, 0), None);
        assert_eq!(memory_percent(20, 10), Some(100.0));
    }

    #[tokio::test]
    async fn cpu_sampler_reads_host_counters() {
        let mut sampler = CpuSampler::new();
        sampler.sample().await.unwrap();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        let readings = sampler.sample().await.unwrap();

        let labels: Vec<_> = readings.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["cpu", "memory"]);
        for r in &readings {
            assert!((0.0..=100.0).contains(&r.value), "{} = {}", r.label, r.value);
            assert_eq!(r.unit, "%");
        }
    }

    #[test]
    fn nvidia_smi_first_gpu() {
        assert_eq!(parse_nvidia_smi("37, 64\n12, 40\n"), Some((37.0, 64.0)));
        assert_eq!(parse_nvidia_smi("\n"), None);
        assert_eq!(parse_nvidia_smi("[N/A], 40"), None);
    }

    #[test]
    fn default_samplers_match_kind() {
        assert_eq!(sampler_for(MonitorKind::Cpu).kind(), MonitorKind::Cpu);
        assert_eq!(sampler_for(MonitorKind::Gpu).kind(), MonitorKind::Gpu);
    }
}
