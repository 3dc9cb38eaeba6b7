//! Exchange adapters (spec §4.2, component B "Exchange Adapter").
//!
//! An [`Adapter`] owns exactly one [`ConnectionManager`] and layers
//! subscription bookkeeping and message parsing on top of it. The wire
//! format itself is pluggable through [`MessageParser`] — [`binance`] is the
//! one illustrative exchange implementation provided; adding another
//! exchange means writing a new `MessageParser`, not touching `Adapter`.

pub mod binance;
pub mod status;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState};
use crate::error::{ErrorClass, Result};
use crate::record::{DataType, NormalizedRecord, SubscriptionDescriptor};
use status::{AdapterLifecycle, AdapterStatus, Connectivity, HealthTracker, Performance};

/// Configuration an [`Adapter`] is initialized with (spec §4.2 `initialize(cfg)`).
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Exchange display name, used as `NormalizedRecord.exchange` and in topics.
    pub exchange: String,
    /// Base WebSocket endpoint (scheme + host[:port]).
    pub endpoint: String,
    /// Connection policy (timeouts, retry, heartbeat, circuit breaker,
    /// combined-stream settings). `url` is overwritten with `endpoint`.
    pub connection: ConnectionConfig,
    /// Optional bearer/API credential; presence alone does not validate it.
    pub auth_token: Option<String>,
    /// Size of the rolling window used for health/error-rate accounting.
    pub health_window: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            exchange: String::new(),
            endpoint: String::new(),
            connection: ConnectionConfig::default(),
            auth_token: None,
            health_window: 50,
        }
    }
}

/// Events an [`Adapter`] emits (spec §4.2 "Events emitted").
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    StatusChange {
        old: AdapterLifecycle,
        new: AdapterLifecycle,
    },
    Connected,
    Disconnected,
    Error {
        message: String,
        classification: ErrorClass,
        operation: &'static str,
    },
    Subscribed(SubscriptionDescriptor),
    Unsubscribed(SubscriptionDescriptor),
    Data(NormalizedRecord),
}

/// A pure, total translation between an exchange's wire format and the
/// normalized record shape (spec §4.2 `parseMessage`, "Stream name formation").
pub trait MessageParser: Send + Sync + 'static {
    /// The value placed in every produced record's `exchange` field.
    fn exchange_name(&self) -> &str;

    /// Parse one raw frame. Returns `None` for anything that does not match
    /// this exchange's message shape, including malformed JSON — parsing
    /// never panics or propagates an error for bad input (spec §4.2).
    fn parse_message(&self, frame: &str) -> Option<NormalizedRecord>;

    /// The stream name for a `(symbol, dataType)` subscription. Defaults to
    /// `lower(symbol)@dataType`; exchange-specific adapters may override
    /// this but must keep it pure and total (spec §4.2).
    fn stream_name(&self, symbol: &str, data_type: DataType) -> String {
        format!("{}@{}", symbol.to_lowercase(), data_type)
    }
}

struct Subscriptions {
    by_id: DashMap<String, SubscriptionDescriptor>,
    next_id: AtomicU64,
}

impl Subscriptions {
    fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("sub-{n}")
    }
}

/// Binds a [`MessageParser`] to a [`ConnectionManager`] and exposes
/// subscription management, message parsing, and status aggregation (spec §4.2).
pub struct Adapter<P: MessageParser> {
    parser: Arc<P>,
    exchange: String,
    connection: ConnectionManager,
    subscriptions: Arc<Subscriptions>,
    health: Arc<Mutex<HealthTracker>>,
    events: broadcast::Sender<AdapterEvent>,
    last_lifecycle: Arc<Mutex<AdapterLifecycle>>,
    forward_task: StdMutex<Option<JoinHandle<()>>>,
}

const ADAPTER_EVENT_CAPACITY: usize = 256;

impl<P: MessageParser> Adapter<P> {
    /// Initialize an adapter bound to `cfg` (spec §4.2 `initialize(cfg)`).
    /// Moves to `IDLE`.
    pub fn initialize(parser: P, mut cfg: AdapterConfig) -> Self {
        cfg.connection.url = cfg.endpoint.clone();
        let connection = ConnectionManager::new(cfg.connection.clone());
        let (tx, _rx) = broadcast::channel(ADAPTER_EVENT_CAPACITY);

        let adapter = Self {
            parser: Arc::new(parser),
            exchange: cfg.exchange.clone(),
            connection,
            subscriptions: Arc::new(Subscriptions::new()),
            health: Arc::new(Mutex::new(HealthTracker::new(cfg.health_window))),
            events: tx,
            last_lifecycle: Arc::new(Mutex::new(AdapterLifecycle::Idle)),
            forward_task: StdMutex::new(None),
        };
        adapter.spawn_forwarder();
        adapter
    }

    /// Forward connection-level events into adapter-level events: lifecycle
    /// transitions are deduplicated (spec §8 invariant #1) and incoming
    /// text frames are parsed on this single task, preserving per-stream
    /// delivery order (spec §5, §9 open question on `parseMessage` placement).
    fn spawn_forwarder(&self) {
        let mut rx = self.connection.subscribe();
        let events = self.events.clone();
        let health = self.health.clone();
        let last_lifecycle = self.last_lifecycle.clone();
        let parser = self.parser.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(e) => e,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                };

                match event {
                    ConnectionEvent::StatusChange { to, .. } => {
                        let new_lifecycle = AdapterLifecycle::from(to);
                        let mut guard = last_lifecycle.lock().await;
                        if *guard != new_lifecycle {
                            let old = *guard;
                            *guard = new_lifecycle;
                            drop(guard);
                            let _ = events.send(AdapterEvent::StatusChange {
                                old,
                                new: new_lifecycle,
                            });
                        }
                    }
                    ConnectionEvent::Connected => {
                        let _ = events.send(AdapterEvent::Connected);
                    }
                    ConnectionEvent::Disconnected => {
                        let _ = events.send(AdapterEvent::Disconnected);
                    }
                    ConnectionEvent::HeartbeatTimeout => {
                        health.lock().await.record_outcome(false);
                    }
                    ConnectionEvent::Error { message } => {
                        health.lock().await.record_outcome(false);
                        let _ = events.send(AdapterEvent::Error {
                            message,
                            classification: ErrorClass::Network,
                            operation: "connection",
                        });
                    }
                    ConnectionEvent::Message { payload } => {
                        match parser.parse_message(&payload) {
                            Some(record) => {
                                health.lock().await.record_outcome(true);
                                let _ = events.send(AdapterEvent::Data(record));
                            }
                            None => {
                                health.lock().await.record_classification(ErrorClass::DataFormat);
                            }
                        }
                    }
                    ConnectionEvent::Reconnecting { .. }
                    | ConnectionEvent::Reconnected
                    | ConnectionEvent::Disconnecting
                    | ConnectionEvent::StreamsChanged { .. } => {}
                }
            }
        });

        *self.forward_task.lock().unwrap() = Some(handle);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    /// Create a descriptor and stream-set entry for every `(symbol, dataType)`
    /// pair in the cross product (spec §4.2 `subscribe`).
    pub async fn subscribe(
        &self,
        symbols: &[String],
        data_types: &[DataType],
    ) -> Result<Vec<SubscriptionDescriptor>> {
        let mut created = Vec::with_capacity(symbols.len() * data_types.len());
        for symbol in symbols {
            for data_type in data_types {
                let id = self.subscriptions.next_id();
                let desc = SubscriptionDescriptor::new(id.clone(), symbol.clone(), *data_type);
                let stream_name = self.parser.stream_name(symbol, *data_type);
                self.connection.add_stream(&stream_name).await?;
                self.subscriptions.by_id.insert(id, desc.clone());
                let _ = self.events.send(AdapterEvent::Subscribed(desc.clone()));
                created.push(desc);
            }
        }
        Ok(created)
    }

    /// Remove the named descriptors and recompute the stream set (spec §4.2 `unsubscribe`).
    pub async fn unsubscribe(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            if let Some((_, desc)) = self.subscriptions.by_id.remove(id) {
                let stream_name = self.parser.stream_name(&desc.symbol, desc.data_type);
                if !self.has_other_subscribers(&stream_name) {
                    self.connection.remove_stream(&stream_name).await?;
                }
                let _ = self.events.send(AdapterEvent::Unsubscribed(desc));
            }
        }
        Ok(())
    }

    fn has_other_subscribers(&self, stream_name: &str) -> bool {
        self.subscriptions
            .by_id
            .iter()
            .any(|entry| self.parser.stream_name(&entry.symbol, entry.data_type) == stream_name)
    }

    /// Remove every descriptor and empty the stream set (spec §4.2 `unsubscribeAll`).
    pub async fn unsubscribe_all(&self) -> Result<()> {
        let ids: Vec<String> = self
            .subscriptions
            .by_id
            .iter()
            .map(|e| e.key().clone())
            .collect();
        self.unsubscribe(&ids).await
    }

    /// All currently-active descriptors (spec §8 invariant #6 `getSubscriptions`).
    pub fn subscriptions(&self) -> Vec<SubscriptionDescriptor> {
        self.subscriptions
            .by_id
            .iter()
            .map(|e| e.value().clone())
            .collect()
    }

    /// Parse a raw frame into a normalized record (spec §4.2 `parseMessage`).
    pub fn parse_message(&self, frame: &str) -> Option<NormalizedRecord> {
        self.parser.parse_message(frame)
    }

    /// Aggregate connection state and recent error/latency stats (spec §4.2 `getStatus`).
    pub async fn status(&self) -> AdapterStatus {
        let state = self.connection.state().await;
        let health = self.health.lock().await;
        AdapterStatus {
            status: AdapterLifecycle::from(state),
            health: health.health(),
            connectivity: Connectivity {
                connected: state == ConnectionState::Connected,
                reconnecting: state == ConnectionState::Reconnecting,
            },
            performance: Performance {
                error_rate: health.error_rate(),
                average_latency: health.average_latency_ms(),
            },
        }
    }

    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Tear down the connection manager and clear descriptors (spec §4.2 `destroy`).
    pub async fn destroy(&self) {
        self.connection.destroy().await;
        self.subscriptions.by_id.clear();
        if let Some(handle) = self.forward_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}
