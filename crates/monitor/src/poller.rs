//! The background polling task.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sampler::Sampler;
use crate::{MonitorKind, Sample};

/// A running monitor.
///
/// Dropping a `Poller` without calling [`stop`](Poller::stop) aborts the
/// task; `stop` is the orderly path and waits for the task to exit.
pub struct Poller {
    kind: MonitorKind,
    handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    samples_tx: broadcast::Sender<Sample>,
    history: Arc<Mutex<VecDeque<Sample>>>,
}

impl Poller {
    /// Spawn a task polling `sampler` every `interval`, keeping the last
    /// `history_len` samples.
    pub fn spawn(sampler: Box<dyn Sampler>, interval: Duration, history_len: usize) -> Self {
        let kind = sampler.kind();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (samples_tx, _) = broadcast::channel(history_len.max(1) * 2);
        let history = Arc::new(Mutex::new(VecDeque::with_capacity(history_len)));

        let handle = tokio::spawn(run(
            sampler,
            interval,
            history_len.max(1),
            shutdown_rx,
            samples_tx.clone(),
            Arc::clone(&history),
        ));

        info!(monitor = %kind, interval_ms = interval.as_millis() as u64, "Monitoring started");
        Self {
            kind,
            handle: Some(handle),
            shutdown_tx,
            samples_tx,
            history,
        }
    }

    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    /// Receive every sample published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Sample> {
        self.samples_tx.subscribe()
    }

    /// Retained samples, oldest first.
    pub fn history(&self) -> Vec<Sample> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.history.lock().ok().and_then(|h| h.back().cloned())
    }

    /// Signal the task and wait until it has exited.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!(monitor = %self.kind, error = %e, "Monitor task ended abnormally");
        }
        info!(monitor = %self.kind, "Monitoring stopped");
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run(
    mut sampler: Box<dyn Sampler>,
    interval: Duration,
    history_len: usize,
    mut shutdown_rx: watch::Receiver<bool>,
    samples_tx: broadcast::Sender<Sample>,
    history: Arc<Mutex<VecDeque<Sample>>>,
) {
    let kind = sampler.kind();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_error: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            r = sampler.sample() => r,
        };

        match result {
            Ok(readings) => {
                last_error = None;
                let sample = Sample {
                    kind,
                    timestamp: Utc::now(),
                    readings,
                };
                if let Ok(mut h) = history.lock() {
                    if h.len() == history_len {
                        h.pop_front();
                    }
                    h.push_back(sample.clone());
                }
                // No subscribers is fine
                let _ = samples_tx.send(sample);
            }
            Err(e) => {
                // Log once per distinct failure instead of every tick.
                let msg = e.to_string();
                if last_error.as_deref() != Some(msg.as_str()) {
                    warn!(monitor = %kind, error = %msg, "Sampling failed");
                    last_error = Some(msg);
                }
            }
        }
    }

    debug!(monitor = %kind, "Monitor task exiting");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{MonitorError, Reading};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits 1.0, 2.0, 3.0, ... and counts calls.
    pub(crate) struct CountingSampler {
        pub kind: MonitorKind,
        pub calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Sampler for CountingSampler {
        fn kind(&self) -> MonitorKind {
            self.kind
        }

        async fn sample(&mut self) -> Result<Vec<Reading>, MonitorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(vec![Reading::percent("value", n as f32)])
        }
    }

    struct FailingSampler;

    #[async_trait]
    impl Sampler for FailingSampler {
        fn kind(&self) -> MonitorKind {
            MonitorKind::Gpu
        }

        async fn sample(&mut self) -> Result<Vec<Reading>, MonitorError> {
            Err(MonitorError::Unavailable("no gpu".into()))
        }
    }

    fn counting(calls: &Arc<AtomicUsize>) -> Box<dyn Sampler> {
        Box::new(CountingSampler {
            kind: MonitorKind::Cpu,
            calls: Arc::clone(calls),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_samples_to_subscribers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(&calls), Duration::from_secs(1), 30);
        let mut rx = poller.subscribe();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, MonitorKind::Cpu);
        assert!(second.readings[0].value > first.readings[0].value);

        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_bounded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(&calls), Duration::from_millis(10), 5);
        let mut rx = poller.subscribe();
        for _ in 0..12 {
            rx.recv().await.unwrap();
        }

        let history = poller.history();
        assert_eq!(history.len(), 5);
        let values: Vec<f32> = history.iter().map(|s| s.readings[0].value).collect();
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, sorted);
        assert_eq!(poller.latest().unwrap().readings[0].value, *values.last().unwrap());

        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_exit_and_no_more_samples() {
        let calls = Arc::new(AtomicUsize::new(0));
        let poller = Poller::spawn(counting(&calls), Duration::from_secs(1), 30);
        let mut rx = poller.subscribe();
        rx.recv().await.unwrap();

        poller.stop().await;
        let after_stop = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
        // Sender dropped with the poller: the channel is closed.
        loop {
            match rx.recv().await {
                Ok(_) => continue,
                Err(e) => {
                    assert!(matches!(e, broadcast::error::RecvError::Closed));
                    break;
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_errors_do_not_stop_the_task() {
        let poller = Poller::spawn(Box::new(FailingSampler), Duration::from_secs(1), 30);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(poller.history().is_empty());
        poller.stop().await;
    }
}
