//! A metrics recorder that periodically logs all captured counters.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// A metrics recorder that keeps values in memory and logs them with `tracing`.
#[derive(Clone)]
pub struct LoggingRecorder {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

impl LoggingRecorder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new(AtomicStorage)),
        }
    }

    /// Current counter values, sorted by rendered key.
    pub fn counter_snapshot(&self) -> Vec<(String, u64)> {
        let mut values: Vec<(String, u64)> = self
            .registry
            .get_counter_handles()
            .into_iter()
            .map(|(key, counter)| (render_key(&key), counter.load(Ordering::Relaxed)))
            .collect();
        values.sort();
        values
    }

    /// Spawns the task that logs a snapshot every `interval` until shutdown.
    pub fn spawn_reporter(
        &self,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let recorder = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately and would log an empty snapshot.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        for (key, value) in recorder.counter_snapshot() {
                            info!("[Counter] {}: {}", key, value);
                        }
                    }
                }
            }
        })
    }
}

impl Default for LoggingRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn render_key(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|label| format!("{}={}", label.key(), label.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for LoggingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry
            .get_or_create_counter(key, |c| Counter::from_arc(c.clone()))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry
            .get_or_create_gauge(key, |g| Gauge::from_arc(g.clone()))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry
            .get_or_create_histogram(key, |h| Histogram::from_arc(h.clone()))
    }
}
