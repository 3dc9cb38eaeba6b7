//! Batching and retry-exhaustion semantics (spec §4.3).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marketfeed_collector::error::{CollectorError, Result};
use marketfeed_collector::publisher::bus::BusClient;
use marketfeed_collector::publisher::{Publisher, PublisherConfig};
use marketfeed_collector::record::{DataType, NormalizedRecord};

struct CountingBus {
    calls: AtomicUsize,
    batch_sizes: std::sync::Mutex<Vec<usize>>,
}

impl CountingBus {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            batch_sizes: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BusClient for CountingBus {
    async fn publish_batch(&self, _topic: &str, records: &[NormalizedRecord]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(records.len());
        Ok(())
    }
}

struct AlwaysFailsBus;

#[async_trait]
impl BusClient for AlwaysFailsBus {
    async fn publish_batch(&self, _topic: &str, _records: &[NormalizedRecord]) -> Result<()> {
        Err(CollectorError::NetworkIssue("bus unreachable".into()))
    }
}

fn sample_record() -> NormalizedRecord {
    NormalizedRecord {
        exchange: "binance".into(),
        symbol: "BTCUSDT".into(),
        data_type: DataType::Trade,
        timestamp: 0,
        data: serde_json::json!({}),
        received_at: 0,
    }
}

#[tokio::test]
async fn immediate_publish_when_batching_disabled() {
    let bus = Arc::new(CountingBus::new());
    let publisher = Publisher::new(
        bus.clone(),
        PublisherConfig {
            enable_batching: false,
            ..PublisherConfig::default()
        },
    );

    publisher.publish("market-data.binance.trade", sample_record()).await.unwrap();
    assert_eq!(bus.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_flushes_once_size_threshold_is_reached() {
    let bus = Arc::new(CountingBus::new());
    let publisher = Publisher::new(
        bus.clone(),
        PublisherConfig {
            enable_batching: true,
            batch_size: 3,
            batch_timeout: Duration::from_secs(60),
            ..PublisherConfig::default()
        },
    );

    for _ in 0..3 {
        publisher
            .publish("market-data.binance.trade", sample_record())
            .await
            .unwrap();
    }

    assert_eq!(bus.calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.batch_sizes.lock().unwrap().as_slice(), &[3]);
}

#[tokio::test]
async fn batch_timeout_flush_failure_increments_publish_errors() {
    let bus = Arc::new(AlwaysFailsBus);
    let publisher = Publisher::new(
        bus,
        PublisherConfig {
            enable_batching: true,
            batch_size: 100,
            batch_timeout: Duration::from_millis(10),
            max_retries: 0,
            initial_retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(1),
        },
    );

    // Below batch_size, so this only starts the batch_timeout timer — the
    // failure surfaces on the detached timer task, not as a `publish()` error.
    publisher
        .publish("market-data.binance.trade", sample_record())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(publisher.publish_errors(), 1);
}

#[tokio::test]
async fn publish_errors_counter_increments_after_retry_exhaustion() {
    let bus = Arc::new(AlwaysFailsBus);
    let publisher = Publisher::new(
        bus,
        PublisherConfig {
            enable_batching: false,
            max_retries: 2,
            initial_retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(5),
            ..PublisherConfig::default()
        },
    );

    let err = publisher
        .publish("market-data.binance.trade", sample_record())
        .await
        .unwrap_err();
    assert!(matches!(err, CollectorError::NetworkIssue(_)));
    assert_eq!(publisher.publish_errors(), 1);
}
