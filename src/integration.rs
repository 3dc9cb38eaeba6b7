//! Binds one Adapter to one Publisher (spec §4.4, component D "Adapter Integration").

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::adapter::status::AdapterStatus;
use crate::adapter::{Adapter, AdapterEvent, MessageParser};
use crate::error::{CollectorError, Result};
use crate::publisher::Publisher;

const LATENCY_EWMA_ALPHA: f64 = 0.2;
const INTEGRATION_EVENT_CAPACITY: usize = 256;

/// Per-instance metrics maintained by the Integration (spec §4.4).
#[derive(Debug, Clone)]
pub struct IntegrationMetrics {
    pub messages_processed: u64,
    pub messages_published: u64,
    pub processing_errors: u64,
    pub publish_errors: u64,
    pub average_processing_latency_ms: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl Default for IntegrationMetrics {
    fn default() -> Self {
        Self {
            messages_processed: 0,
            messages_published: 0,
            processing_errors: 0,
            publish_errors: 0,
            average_processing_latency_ms: 0.0,
            last_activity: None,
        }
    }
}

/// Events forwarded/derived by an Integration for the Registry (spec §4.5).
#[derive(Debug, Clone)]
pub enum IntegrationEvent {
    Started,
    Stopped,
    DataProcessed,
    StatusChange,
}

#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    pub topic_prefix: String,
    /// How long `stop()` waits for the adapter to disconnect before forcing
    /// termination (spec §4.4 "stop is bounded").
    pub stop_grace_period: Duration,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "market-data".to_owned(),
            stop_grace_period: Duration::from_secs(5),
        }
    }
}

/// One bound `(Adapter, Publisher)` lifecycle unit (spec §3 "Integration instance").
pub struct Integration<P: MessageParser> {
    adapter: Arc<Adapter<P>>,
    publisher: Arc<Publisher>,
    config: IntegrationConfig,
    metrics: Arc<Mutex<IntegrationMetrics>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    events: broadcast::Sender<IntegrationEvent>,
    forward_task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl<P: MessageParser> Integration<P> {
    pub fn new(adapter: Adapter<P>, publisher: Publisher, config: IntegrationConfig) -> Self {
        let (tx, _rx) = broadcast::channel(INTEGRATION_EVENT_CAPACITY);
        Self {
            adapter: Arc::new(adapter),
            publisher: Arc::new(publisher),
            config,
            metrics: Arc::new(Mutex::new(IntegrationMetrics::default())),
            started_at: Mutex::new(None),
            events: tx,
            forward_task: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<IntegrationEvent> {
        self.events.subscribe()
    }

    pub fn adapter(&self) -> &Adapter<P> {
        &self.adapter
    }

    /// Open the adapter connection and begin forwarding `data` events to the
    /// publisher (spec §4.4 `start()`). Fails `AlreadyRunning` if already
    /// started; does not re-enter and does not leak a second forwarder task.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning(
                self.adapter.exchange().to_owned(),
            ));
        }

        if let Err(e) = self.adapter.connect().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        *self.started_at.lock().await = Some(Utc::now());

        let mut rx = self.adapter.subscribe_events();
        let publisher = self.publisher.clone();
        let metrics = self.metrics.clone();
        let events = self.events.clone();
        let topic_prefix = self.config.topic_prefix.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                };

                if let AdapterEvent::Data(record) = event {
                    let received_at = record.received_at;
                    let topic = record.topic(&topic_prefix);

                    {
                        let mut m = metrics.lock().await;
                        m.messages_processed += 1;
                        m.last_activity = Some(Utc::now());
                    }

                    match publisher.publish(&topic, record).await {
                        Ok(()) => {
                            let ack_latency_ms =
                                (Utc::now().timestamp_millis() - received_at).max(0) as f64;
                            let mut m = metrics.lock().await;
                            m.messages_published += 1;
                            m.average_processing_latency_ms = if m.average_processing_latency_ms == 0.0 {
                                ack_latency_ms
                            } else {
                                LATENCY_EWMA_ALPHA * ack_latency_ms
                                    + (1.0 - LATENCY_EWMA_ALPHA) * m.average_processing_latency_ms
                            };
                            let _ = events.send(IntegrationEvent::DataProcessed);
                        }
                        Err(_) => {
                            metrics.lock().await.publish_errors += 1;
                        }
                    }
                }
            }
        });

        *self.forward_task.lock().await = Some(handle);
        let _ = self.events.send(IntegrationEvent::Started);
        Ok(())
    }

    /// Unsubscribe, disconnect, and flush pending publishes; forces
    /// termination if the adapter does not settle within the grace period
    /// (spec §4.4). Fails `NotRunning` if not currently started.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(CollectorError::NotRunning(
                self.adapter.exchange().to_owned(),
            ));
        }

        self.adapter.unsubscribe_all().await?;

        let disconnect = self.adapter.disconnect();
        if tokio::time::timeout(self.config.stop_grace_period, disconnect)
            .await
            .is_err()
        {
            self.adapter.destroy().await;
        }

        self.publisher.flush_all().await;

        if let Some(handle) = self.forward_task.lock().await.take() {
            handle.abort();
        }

        let _ = self.events.send(IntegrationEvent::Stopped);
        Ok(())
    }

    /// Idempotent teardown (spec §4.4 `destroy()`).
    pub async fn destroy(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.forward_task.lock().await.take() {
            handle.abort();
        }
        self.adapter.destroy().await;
    }

    pub async fn status(&self) -> AdapterStatus {
        self.adapter.status().await
    }

    pub async fn metrics(&self) -> IntegrationMetrics {
        self.metrics.lock().await.clone()
    }

    pub async fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.lock().await
    }
}
