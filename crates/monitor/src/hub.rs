//! At most one poller per monitor kind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};

use crate::poller::Poller;
use crate::sampler::{Sampler, sampler_for};
use crate::{MonitorError, MonitorKind, Sample};

type SamplerFactory = Arc<dyn Fn(MonitorKind) -> Box<dyn Sampler> + Send + Sync>;

/// Starts, stops and exposes the running monitors.
pub struct MonitorHub {
    pollers: Mutex<HashMap<MonitorKind, Poller>>,
    interval: Duration,
    history_len: usize,
    factory: SamplerFactory,
}

impl MonitorHub {
    pub fn new(interval: Duration, history_len: usize) -> Self {
        Self {
            pollers: Mutex::new(HashMap::new()),
            interval,
            history_len,
            factory: Arc::new(sampler_for),
        }
    }

    /// Replace the hardware samplers (used by tests and headless builds).
    pub fn with_sampler_factory(
        mut self,
        factory: impl Fn(MonitorKind) -> Box<dyn Sampler> + Send + Sync + 'static,
    ) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    /// Start monitoring `kind` and subscribe to its samples.
    pub async fn start(&self, kind: MonitorKind) -> Result<broadcast::Receiver<Sample>, MonitorError> {
        let mut pollers = self.pollers.lock().await;
        if pollers.contains_key(&kind) {
            return Err(MonitorError::AlreadyRunning(kind));
        }
        let poller = Poller::spawn((self.factory)(kind), self.interval, self.history_len);
        let rx = poller.subscribe();
        pollers.insert(kind, poller);
        Ok(rx)
    }

    /// Stop monitoring `kind`; returns once its task has exited.
    pub async fn stop(&self, kind: MonitorKind) -> Result<(), MonitorError> {
        let poller = self
            .pollers
            .lock()
            .await
            .remove(&kind)
            .ok_or(MonitorError::NotRunning(kind))?;
        poller.stop().await;
        Ok(())
    }

    pub async fn stop_all(&self) {
        let pollers: Vec<Poller> = self.pollers.lock().await.drain().map(|(_, p)| p).collect();
        for poller in pollers {
            poller.stop().await;
        }
    }

    pub async fn is_running(&self, kind: MonitorKind) -> bool {
        self.pollers.lock().await.contains_key(&kind)
    }

    pub async fn subscribe(&self, kind: MonitorKind) -> Option<broadcast::Receiver<Sample>> {
        self.pollers.lock().await.get(&kind).map(Poller::subscribe)
    }

    pub async fn history(&self, kind: MonitorKind) -> Vec<Sample> {
        self.pollers
            .lock()
            .await
            .get(&kind)
            .map(Poller::history)
            .unwrap_or_default()
    }

    pub async fn latest(&self, kind: MonitorKind) -> Option<Sample> {
        self.pollers.lock().await.get(&kind).and_then(Poller::latest)
    }

    /// Take a single sample without starting a monitor.
    ///
    /// CPU load is a delta between two reads, so the sampler is primed
    /// and read again after a short pause.
    pub async fn sample_now(&self, kind: MonitorKind) -> Result<Sample, MonitorError> {
        let mut sampler = (self.factory)(kind);
        if kind == MonitorKind::Cpu {
            sampler.sample().await?;
            tokio::time::sleep(CPU_PRIME_DELAY).await;
        }
        let readings = sampler.sample().await?;
        Ok(Sample {
            kind,
            timestamp: chrono::Utc::now(),
            readings,
        })
    }
}

const CPU_PRIME_DELAY: Duration = Duration::from_millis(250);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::tests::CountingSampler;
    use std::sync::atomic::AtomicUsize;

    fn hub() -> MonitorHub {
        MonitorHub::new(Duration::from_secs(1), 30).with_sampler_factory(|kind| {
            Box::new(CountingSampler {
                kind,
                calls: Arc::new(AtomicUsize::new(0)),
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_reports_already_running() {
        let hub = hub();
        hub.start(MonitorKind::Cpu).await.unwrap();
        let err = hub.start(MonitorKind::Cpu).await.unwrap_err();
        assert!(matches!(err, MonitorError::AlreadyRunning(MonitorKind::Cpu)));
        assert_eq!(err.to_string(), "cpu monitoring is already running");
        hub.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_are_independent() {
        let hub = hub();
        let mut cpu = hub.start(MonitorKind::Cpu).await.unwrap();
        let mut gpu = hub.start(MonitorKind::Gpu).await.unwrap();
        assert_eq!(cpu.recv().await.unwrap().kind, MonitorKind::Cpu);
        assert_eq!(gpu.recv().await.unwrap().kind, MonitorKind::Gpu);

        hub.stop(MonitorKind::Cpu).await.unwrap();
        assert!(!hub.is_running(MonitorKind::Cpu).await);
        assert!(hub.is_running(MonitorKind::Gpu).await);
        hub.stop_all().await;
        assert!(!hub.is_running(MonitorKind::Gpu).await);
    }

    #[tokio::test]
    async fn stop_when_idle_is_an_error() {
        let hub = hub();
        assert!(matches!(
            hub.stop(MonitorKind::Gpu).await.unwrap_err(),
            MonitorError::NotRunning(MonitorKind::Gpu)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sample_now_does_not_start_a_monitor() {
        let hub = hub();
        let sample = hub.sample_now(MonitorKind::Cpu).await.unwrap();
        // primed once, then read
        assert_eq!(sample.readings[0].value, 2.0);
        assert!(!hub.is_running(MonitorKind::Cpu).await);

        let gpu = hub.sample_now(MonitorKind::Gpu).await.unwrap();
        assert_eq!(gpu.readings[0].value, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn history_and_latest_follow_the_poller() {
        let hub = hub();
        assert!(hub.latest(MonitorKind::Cpu).await.is_none());
        let mut rx = hub.start(MonitorKind::Cpu).await.unwrap();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(hub.history(MonitorKind::Cpu).await.len() >= 2);
        assert!(hub.latest(MonitorKind::Cpu).await.is_some());
        hub.stop(MonitorKind::Cpu).await.unwrap();
        assert!(hub.history(MonitorKind::Cpu).await.is_empty());
    }
}
