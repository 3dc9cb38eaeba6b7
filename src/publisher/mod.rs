//! The record publisher (spec §4.3, component C "Publisher").

pub mod bus;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub use bus::BusClient;
use crate::error::Result;
use crate::record::NormalizedRecord;

/// Batching and retry policy (spec §4.3 "Batching policy", "Retry").
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub enable_batching: bool,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enable_batching: true,
            batch_size: 100,
            batch_timeout: Duration::from_millis(500),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct TopicBatch {
    records: Mutex<Vec<NormalizedRecord>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Accepts `(topic, record)` pairs, batches per topic, and publishes to a
/// shared [`BusClient`] with retry (spec §4.3).
///
/// Records within one topic preserve submission order: each topic's batch
/// buffer is append-only and flushed whole, in order, under that topic's own
/// mutex (spec §4.3 "Ordering").
pub struct Publisher {
    bus: Arc<dyn BusClient>,
    config: PublisherConfig,
    batches: Arc<dashmap::DashMap<String, Arc<TopicBatch>>>,
    publish_errors: Arc<AtomicU64>,
}

impl Publisher {
    pub fn new(bus: Arc<dyn BusClient>, config: PublisherConfig) -> Self {
        Self {
            bus,
            config,
            batches: Arc::new(dashmap::DashMap::new()),
            publish_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total retry-exhaustion count across all topics.
    pub fn publish_errors(&self) -> u64 {
        self.publish_errors.load(Ordering::Relaxed)
    }

    /// Submit one record to `topic`. With batching disabled, publishes
    /// immediately; otherwise the record is appended to the topic's pending
    /// batch, which flushes at `batch_size` or `batch_timeout`, whichever
    /// comes first.
    pub async fn publish(&self, topic: &str, record: NormalizedRecord) -> Result<()> {
        if !self.config.enable_batching {
            return self.publish_with_retry(topic, vec![record]).await;
        }

        let batch = self
            .batches
            .entry(topic.to_owned())
            .or_insert_with(|| Arc::new(TopicBatch::default()))
            .clone();

        let should_flush_now = {
            let mut records = batch.records.lock().await;
            records.push(record);
            records.len() >= self.config.batch_size
        };

        if should_flush_now {
            return self.flush_topic(topic, &batch).await;
        }

        let mut timer = batch.timer.lock().await;
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let topic = topic.to_owned();
        let batch_for_timer = batch.clone();
        let bus = self.bus.clone();
        let publish_errors = self.publish_errors.clone();
        let timeout = self.config.batch_timeout;
        let retry_cfg = self.config.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let drained: Vec<NormalizedRecord> = {
                let mut records = batch_for_timer.records.lock().await;
                std::mem::take(&mut *records)
            };
            if drained.is_empty() {
                return;
            }
            if publish_with_retry_static(&bus, &topic, drained, &retry_cfg)
                .await
                .is_err()
            {
                publish_errors.fetch_add(1, Ordering::Relaxed);
            }
        });
        *timer = Some(handle);
        Ok(())
    }

    async fn flush_topic(&self, topic: &str, batch: &Arc<TopicBatch>) -> Result<()> {
        if let Some(h) = batch.timer.lock().await.take() {
            h.abort();
        }
        let drained: Vec<NormalizedRecord> = {
            let mut records = batch.records.lock().await;
            std::mem::take(&mut *records)
        };
        if drained.is_empty() {
            return Ok(());
        }
        self.publish_with_retry(topic, drained).await
    }

    /// Force-flush every topic's pending batch (used by Integration `stop()`).
    /// Per-topic failures are counted in `publish_errors` but not surfaced
    /// here — there is no caller left to hand a per-topic error to.
    pub async fn flush_all(&self) {
        let topics: Vec<(String, Arc<TopicBatch>)> = self
            .batches
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (topic, batch) in topics {
            let _ = self.flush_topic(&topic, &batch).await;
        }
    }

    async fn publish_with_retry(&self, topic: &str, records: Vec<NormalizedRecord>) -> Result<()> {
        let result = publish_with_retry_static(&self.bus, topic, records, &self.config).await;
        if result.is_err() {
            self.publish_errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

async fn publish_with_retry_static(
    bus: &Arc<dyn BusClient>,
    topic: &str,
    records: Vec<NormalizedRecord>,
    cfg: &PublisherConfig,
) -> Result<()> {
    let mut attempt = 0u32;
    loop {
        match bus.publish_batch(topic, &records).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                if attempt >= cfg.max_retries {
                    return Err(err);
                }
                let delay_ms = (cfg.initial_retry_delay.as_millis() as f64) * 2f64.powi(attempt as i32);
                let delay = Duration::from_millis(
                    delay_ms.min(cfg.max_retry_delay.as_millis() as f64) as u64,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Per-topic snapshot, exposed for diagnostics (HTTP `/metrics/json`, §6).
pub async fn pending_batch_sizes(publisher: &Publisher) -> HashMap<String, usize> {
    let mut sizes = HashMap::new();
    for entry in publisher.batches.iter() {
        sizes.insert(entry.key().clone(), entry.value().records.lock().await.len());
    }
    sizes
}
