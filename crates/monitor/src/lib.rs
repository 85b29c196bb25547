//! Hardware monitoring for Slothtop.
//!
//! A [`Poller`] owns one background task that samples a [`Sampler`] on a
//! fixed interval, keeps a short rolling history, and broadcasts each
//! [`Sample`] to subscribers. It never touches the agent or the settings.
//! [`MonitorHub`] keeps at most one poller per [`MonitorKind`].

pub mod hub;
pub mod poller;
pub mod sampler;

pub use hub::MonitorHub;
pub use poller::Poller;
pub use sampler::{CpuSampler, GpuSampler, Sampler};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which hardware a monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    /// CPU load and memory usage
    Cpu,
    /// GPU load and temperature
    Gpu,
}

impl MonitorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MonitorKind::Cpu => "cpu",
            MonitorKind::Gpu => "gpu",
        }
    }
}

impl std::fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MonitorKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(MonitorKind::Cpu),
            "gpu" => Ok(MonitorKind::Gpu),
            other => Err(MonitorError::UnknownKind(other.to_string())),
        }
    }
}

/// One measured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub label: String,
    pub value: f32,
    pub unit: String,
}

impl Reading {
    pub fn percent(label: &str, value: f32) -> Self {
        Self {
            label: label.into(),
            value,
            unit: "%".into(),
        }
    }
}

/// Everything one poll produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub kind: MonitorKind,
    pub timestamp: DateTime<Utc>,
    pub readings: Vec<Reading>,
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.kind)?;
        for r in &self.readings {
            write!(f, " | {} {:.1}{}", r.label, r.value, r.unit)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MonitorError {
    #[error("{0} monitoring is already running")]
    AlreadyRunning(MonitorKind),

    #[error("{0} monitoring is not running")]
    NotRunning(MonitorKind),

    #[error("Unknown monitor kind: {0}")]
    UnknownKind(String),

    #[error("Hardware counters unavailable: {0}")]
    Unavailable(String),
}
