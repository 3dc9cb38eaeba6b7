//! The per-exchange connection core (spec §4.1).
//!
//! One [`ConnectionManager`] owns exactly one WebSocket: a private receive
//! loop task, a heartbeat task, and — under `autoManage` — a coalescing
//! batch-reconnect task. Sends are serialized through a
//! `tokio::sync::Mutex`-guarded writer half, and state/metrics/stream-set are
//! guarded by a single `RwLock`, all grounded on
//! `dhan_rs::ws::manager::DhanFeedManager`'s `ManagedConnection` (its
//! `Arc<Mutex<Option<WriterHalf>>>` writer and `tokio::spawn`-per-connection
//! receive loop).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::circuit_breaker::CircuitBreaker;
use super::config::ConnectionConfig;
use super::events::{ConnectionEvent, EventEmitter};
use super::metrics::ConnectionMetrics;
use super::state::ConnectionState;
use super::stream_set::StreamSet;
use super::url::build_stream_url;
use crate::error::{CollectorError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WriterHalf = futures_util::stream::SplitSink<WsStream, Message>;

struct PendingPing {
    sent_at: Instant,
    tx: oneshot::Sender<f64>,
}

/// Shared state behind [`ConnectionManager`]'s cheap handles. Tasks spawned
/// by the manager hold an `Arc<Inner>`, not a back-reference to the manager
/// itself (spec §9 "no back-pointers are retained after destroy()").
struct Inner {
    config: RwLock<ConnectionConfig>,
    state: RwLock<ConnectionState>,
    metrics: RwLock<ConnectionMetrics>,
    streams: RwLock<StreamSet>,
    writer: Mutex<Option<WriterHalf>>,
    current_url: Mutex<Option<String>>,
    events: EventEmitter,
    circuit_breaker: Mutex<CircuitBreaker>,
    reconnect_attempt: AtomicU32,
    destroyed: AtomicBool,
    pending_pings: Mutex<HashMap<u64, PendingPing>>,
    next_ping_id: AtomicU64,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    batch_task: Mutex<Option<JoinHandle<()>>>,
}

/// Owns a single WebSocket connection: state machine, heartbeat, reconnect
/// policy, and stream set (spec §4.1).
///
/// Cloning a `ConnectionManager` yields another handle to the same
/// connection (cheap `Arc` clone) — this mirrors how observers (an
/// `ExchangeAdapter`, a health monitor) hold a reference without owning the
/// connection's lifecycle.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Construct a manager in `IDLE` state. Does not connect.
    pub fn new(config: ConnectionConfig) -> Self {
        let circuit_breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        let streams = StreamSet::from_iter(config.combined_stream.streams.clone());
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                state: RwLock::new(ConnectionState::Idle),
                metrics: RwLock::new(ConnectionMetrics::default()),
                streams: RwLock::new(streams),
                writer: Mutex::new(None),
                current_url: Mutex::new(None),
                events: EventEmitter::new(),
                circuit_breaker: Mutex::new(circuit_breaker),
                reconnect_attempt: AtomicU32::new(0),
                destroyed: AtomicBool::new(false),
                pending_pings: Mutex::new(HashMap::new()),
                next_ping_id: AtomicU64::new(0),
                recv_task: Mutex::new(None),
                heartbeat_task: Mutex::new(None),
                batch_task: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to this connection's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Current state.
    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    /// `isConnected() ⇔ state = CONNECTED` (spec §3 invariant). The
    /// underlying socket is always torn down on any exit from `CONNECTED`,
    /// so the state alone is a faithful proxy for "socket reports open".
    pub async fn is_connected(&self) -> bool {
        *self.inner.state.read().await == ConnectionState::Connected
    }

    /// Snapshot of current metrics.
    pub async fn metrics(&self) -> ConnectionMetrics {
        self.inner.metrics.read().await.clone()
    }

    /// Snapshot of the active stream set.
    pub async fn active_streams(&self) -> StreamSet {
        self.inner.streams.read().await.clone()
    }

    /// Update the heartbeat interval; takes effect on the next heartbeat tick.
    pub async fn set_heartbeat_interval(&self, ms: u64) {
        self.inner.config.write().await.heartbeat.interval = Duration::from_millis(ms);
    }

    async fn transition(&self, to: ConnectionState) {
        let mut guard = self.inner.state.write().await;
        let from = *guard;
        if from == to {
            return;
        }
        *guard = to;
        drop(guard);
        self.inner
            .events
            .emit(ConnectionEvent::StatusChange { from, to });
    }

    /// Open the connection. Resolves when `state = CONNECTED`.
    ///
    /// Errors: `InvalidConfig` if `cfg.url` is empty or malformed,
    /// `Timeout` if the connect delay exceeds `cfg.connect_timeout`,
    /// `ConnectFailed` if the socket rejects, `CircuitOpen` if the breaker
    /// is open.
    pub async fn connect(&self) -> Result<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(CollectorError::Destroyed);
        }

        let cfg = self.inner.config.read().await.clone();
        cfg.validate()?;

        {
            let mut cb = self.inner.circuit_breaker.lock().await;
            if !cb.allow_attempt() {
                return Err(CollectorError::CircuitOpen);
            }
        }

        self.transition(ConnectionState::Connecting).await;

        let streams = self.inner.streams.read().await.clone();
        let url = build_stream_url(&cfg.url, &streams)?;

        let connect_fut = connect_async(&url);
        let result = tokio::time::timeout(cfg.connect_timeout, connect_fut).await;

        let ws = match result {
            Ok(Ok((ws, _resp))) => ws,
            Ok(Err(e)) => {
                self.inner.circuit_breaker.lock().await.record_outcome(false);
                self.transition(ConnectionState::Error).await;
                self.inner.metrics.write().await.record_error();
                let msg = e.to_string();
                self.inner
                    .events
                    .emit(ConnectionEvent::Error { message: msg.clone() });
                return Err(CollectorError::ConnectFailed(msg));
            }
            Err(_elapsed) => {
                self.inner.circuit_breaker.lock().await.record_outcome(false);
                self.transition(ConnectionState::Error).await;
                self.inner.metrics.write().await.record_error();
                return Err(CollectorError::Timeout);
            }
        };

        self.inner.circuit_breaker.lock().await.record_outcome(true);
        *self.inner.current_url.lock().await = Some(url);
        self.on_socket_established(ws).await;
        Ok(())
    }

    /// Install a freshly-dialed socket: abort whatever receive/heartbeat
    /// tasks were driving the previous socket (if any — `connect()` from
    /// `IDLE` has none), split the new socket, spawn its replacements,
    /// transition to `CONNECTED`, emit `connected`.
    async fn on_socket_established(&self, ws: WsStream) {
        self.abort_socket_tasks().await;

        let (write, read) = ws.split();
        *self.inner.writer.lock().await = Some(write);

        self.inner.reconnect_attempt.store(0, Ordering::SeqCst);
        self.transition(ConnectionState::Connected).await;
        {
            let mut metrics = self.inner.metrics.write().await;
            metrics.record_connected();
            metrics.active_stream_count = self.inner.streams.read().await.len();
        }
        self.inner.events.emit(ConnectionEvent::Connected);

        let recv_handle = tokio::spawn(Self::receive_loop(self.inner.clone(), read));
        *self.inner.recv_task.lock().await = Some(recv_handle);

        let heartbeat_handle = tokio::spawn(Self::heartbeat_loop(self.inner.clone()));
        *self.inner.heartbeat_task.lock().await = Some(heartbeat_handle);
    }

    /// The receive loop: one task per connection, reading frames until the
    /// socket closes or errors, then entering `RECONNECTING` if the close
    /// was not caller-initiated.
    async fn receive_loop(
        inner: Arc<Inner>,
        mut read: futures_util::stream::SplitStream<WsStream>,
    ) {
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    inner.metrics.write().await.record_receive(text.len());
                    inner.events.emit(ConnectionEvent::Message {
                        payload: text.to_string(),
                    });
                }
                Some(Ok(Message::Binary(data))) => {
                    let mut metrics = inner.metrics.write().await;
                    metrics.record_receive(data.len());
                }
                Some(Ok(Message::Pong(payload))) => {
                    Self::resolve_pong(&inner, &payload).await;
                }
                Some(Ok(Message::Ping(_))) => {
                    // Server-initiated pings are not answered here: this
                    // manager drives heartbeats outbound-only (spec §4.1).
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("connection closed by peer");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "connection read error");
                    inner.metrics.write().await.record_error();
                    break;
                }
            }
        }

        if inner.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let was_closing = *inner.state.read().await == ConnectionState::Closing;
        if was_closing {
            let mut guard = inner.state.write().await;
            let from = *guard;
            *guard = ConnectionState::Disconnected;
            drop(guard);
            inner
                .events
                .emit(ConnectionEvent::StatusChange {
                    from,
                    to: ConnectionState::Disconnected,
                });
            inner.events.emit(ConnectionEvent::Disconnected);
            return;
        }

        {
            let mut guard = inner.state.write().await;
            let from = *guard;
            *guard = ConnectionState::Reconnecting;
            drop(guard);
            inner
                .events
                .emit(ConnectionEvent::StatusChange {
                    from,
                    to: ConnectionState::Reconnecting,
                });
        }
        inner.events.emit(ConnectionEvent::Disconnected);

        // Spawned as a new task rather than awaited inline: this receive
        // loop's own task is recorded as `recv_task`, and the reconnect this
        // triggers installs a replacement by calling `abort_socket_tasks`
        // (via `on_socket_established`) against that same handle — it must
        // not be the one doing the aborting.
        tokio::spawn(Self::run_reconnect_loop(inner));
    }

    /// Outbound heartbeat loop: pings every `heartbeat.interval` while
    /// `CONNECTED`; a missed pong transitions to `RECONNECTING`.
    async fn heartbeat_loop(inner: Arc<Inner>) {
        loop {
            let interval = inner.config.read().await.heartbeat.interval;
            tokio::time::sleep(interval).await;

            if *inner.state.read().await != ConnectionState::Connected {
                return;
            }

            let timeout = inner.config.read().await.heartbeat.timeout;
            match Self::send_ping(&inner, timeout).await {
                Ok(rtt_ms) => {
                    inner.metrics.write().await.record_rtt(rtt_ms);
                }
                Err(_) => {
                    inner.events.emit(ConnectionEvent::HeartbeatTimeout);
                    inner.metrics.write().await.record_error();
                    let mut guard = inner.state.write().await;
                    if *guard == ConnectionState::Connected {
                        let from = *guard;
                        *guard = ConnectionState::Reconnecting;
                        drop(guard);
                        inner
                            .events
                            .emit(ConnectionEvent::StatusChange {
                                from,
                                to: ConnectionState::Reconnecting,
                            });
                        // Same reasoning as the receive loop's tail: spawn
                        // rather than await inline, since this task is
                        // `heartbeat_task` and must not abort itself.
                        tokio::spawn(Self::run_reconnect_loop(inner.clone()));
                    }
                    return;
                }
            }
        }
    }

    async fn send_ping(inner: &Arc<Inner>, timeout: Duration) -> Result<f64> {
        let id = inner.next_ping_id.fetch_add(1, Ordering::SeqCst);
        let payload = id.to_le_bytes().to_vec();
        let (tx, rx) = oneshot::channel();

        inner.pending_pings.lock().await.insert(
            id,
            PendingPing {
                sent_at: Instant::now(),
                tx,
            },
        );

        {
            let mut guard = inner.writer.lock().await;
            let writer = guard.as_mut().ok_or(CollectorError::NotOpen)?;
            writer.send(Message::Ping(payload.into())).await?;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(rtt_ms)) => Ok(rtt_ms),
            _ => {
                inner.pending_pings.lock().await.remove(&id);
                Err(CollectorError::Timeout)
            }
        }
    }

    async fn resolve_pong(inner: &Arc<Inner>, payload: &[u8]) {
        if payload.len() != 8 {
            return;
        }
        let id = u64::from_le_bytes(payload.try_into().unwrap());
        if let Some(pending) = inner.pending_pings.lock().await.remove(&id) {
            let rtt_ms = pending.sent_at.elapsed().as_secs_f64() * 1000.0;
            let _ = pending.tx.send(rtt_ms);
        }
    }

    /// Measure round-trip time with a single ping/pong exchange.
    pub async fn ping(&self) -> Result<f64> {
        if !self.is_connected().await {
            return Err(CollectorError::NotOpen);
        }
        let timeout = self.inner.config.read().await.heartbeat.timeout;
        let rtt = Self::send_ping(&self.inner, timeout).await?;
        self.inner.metrics.write().await.record_rtt(rtt);
        Ok(rtt)
    }

    /// Send a JSON-serializable payload as a text frame.
    pub async fn send<T: Serialize>(&self, payload: &T) -> Result<()> {
        if !self.is_connected().await {
            return Err(CollectorError::NotOpen);
        }
        let json = serde_json::to_string(payload)?;
        let len = json.len();
        {
            let mut guard = self.inner.writer.lock().await;
            let writer = guard.as_mut().ok_or(CollectorError::NotOpen)?;
            writer.send(Message::Text(json.into())).await?;
        }
        self.inner.metrics.write().await.record_send(len);
        Ok(())
    }

    /// Gracefully close the connection. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        let state = *self.inner.state.read().await;
        if matches!(
            state,
            ConnectionState::Idle | ConnectionState::Disconnected
        ) {
            return Ok(());
        }

        self.transition(ConnectionState::Closing).await;
        self.inner.events.emit(ConnectionEvent::Disconnecting);

        self.abort_tasks().await;

        let mut guard = self.inner.writer.lock().await;
        if let Some(writer) = guard.as_mut() {
            let _ = writer.send(Message::Close(None)).await;
        }
        *guard = None;
        drop(guard);

        self.transition(ConnectionState::Disconnected).await;
        self.inner.events.emit(ConnectionEvent::Disconnected);
        Ok(())
    }

    /// Manually trigger a reconnect attempt loop (also used internally by
    /// the heartbeat/receive loops and by batched stream-set mutations).
    /// Resolves when `CONNECTED`, or fails with `ReconnectExhausted`.
    pub async fn reconnect(&self) -> Result<()> {
        {
            let state = *self.inner.state.read().await;
            if state != ConnectionState::Reconnecting {
                self.transition(ConnectionState::Reconnecting).await;
            }
        }
        Self::run_reconnect_loop(self.inner.clone()).await;
        if self.is_connected().await {
            Ok(())
        } else {
            Err(CollectorError::ReconnectExhausted {
                attempts: self.inner.reconnect_attempt.load(Ordering::SeqCst),
            })
        }
    }

    /// Drive the backoff-delay reconnect loop until success or
    /// `max_retries` consecutive failures, at which point the manager
    /// enters `ERROR` and stops retrying on its own.
    async fn run_reconnect_loop(inner: Arc<Inner>) {
        let manager = ConnectionManager {
            inner: inner.clone(),
        };

        loop {
            if inner.destroyed.load(Ordering::SeqCst) {
                return;
            }

            let attempt = inner.reconnect_attempt.fetch_add(1, Ordering::SeqCst) + 1;
            let retry = inner.config.read().await.retry.clone();

            if attempt > retry.max_retries {
                manager.transition(ConnectionState::Error).await;
                inner.events.emit(ConnectionEvent::Error {
                    message: format!("reconnect exhausted after {attempt} attempts"),
                });
                return;
            }

            let delay = super::backoff::reconnect_delay(&retry, attempt);
            tokio::time::sleep(delay).await;

            if inner.destroyed.load(Ordering::SeqCst) {
                return;
            }

            inner
                .events
                .emit(ConnectionEvent::Reconnecting { attempt });

            {
                let mut cb = inner.circuit_breaker.lock().await;
                if !cb.allow_attempt() {
                    continue;
                }
            }

            let cfg = inner.config.read().await.clone();
            let streams = inner.streams.read().await.clone();
            let url = match build_stream_url(&cfg.url, &streams) {
                Ok(u) => u,
                Err(_) => continue,
            };

            match tokio::time::timeout(cfg.connect_timeout, connect_async(&url)).await {
                Ok(Ok((ws, _resp))) => {
                    inner.circuit_breaker.lock().await.record_outcome(true);
                    *inner.current_url.lock().await = Some(url);
                    manager.on_socket_established(ws).await;
                    inner.metrics.write().await.record_reconnect();
                    inner.events.emit(ConnectionEvent::Reconnected);
                    return;
                }
                _ => {
                    inner.circuit_breaker.lock().await.record_outcome(false);
                    inner.metrics.write().await.record_error();
                }
            }
        }
    }

    /// Add `name` to the stream set. Under `autoManage`, schedules (or
    /// relies on an already-scheduled) coalescing reconnect rather than
    /// reconnecting immediately.
    pub async fn add_stream(&self, name: &str) -> Result<()> {
        let max_streams = self.inner.config.read().await.combined_stream.max_streams;
        {
            let streams = self.inner.streams.read().await;
            if !streams.contains(name) && streams.len() >= max_streams {
                return Err(CollectorError::StreamLimitReached { max: max_streams });
            }
        }

        let added = {
            let mut streams = self.inner.streams.write().await;
            streams.add(name)
        };

        if added {
            let mut metrics = self.inner.metrics.write().await;
            metrics.stream_operations.additions += 1;
            metrics.active_stream_count = self.inner.streams.read().await.len();
            drop(metrics);
            self.inner.events.emit(ConnectionEvent::StreamsChanged {
                additions: 1,
                removals: 0,
            });
            self.schedule_stream_mutation().await;
        }
        Ok(())
    }

    /// Remove `name` from the stream set. See [`Self::add_stream`] for
    /// batching semantics.
    pub async fn remove_stream(&self, name: &str) -> Result<()> {
        let removed = {
            let mut streams = self.inner.streams.write().await;
            streams.remove(name)
        };

        if removed {
            let mut metrics = self.inner.metrics.write().await;
            metrics.stream_operations.removals += 1;
            metrics.active_stream_count = self.inner.streams.read().await.len();
            drop(metrics);
            self.inner.events.emit(ConnectionEvent::StreamsChanged {
                additions: 0,
                removals: 1,
            });
            self.schedule_stream_mutation().await;
        }
        Ok(())
    }

    /// Under `autoManage`, start a coalescing timer if one is not already
    /// pending. Under manual management, mutations only update the
    /// in-memory set (spec §4.1 "Stream-set mutations & batching").
    async fn schedule_stream_mutation(&self) {
        let cfg = self.inner.config.read().await.combined_stream.clone();
        if !cfg.auto_manage {
            return;
        }

        let mut batch_guard = self.inner.batch_task.lock().await;
        if batch_guard
            .as_ref()
            .is_some_and(|h| !h.is_finished())
        {
            return; // a batch reconnect is already scheduled
        }

        let inner = self.inner.clone();
        let delay = Duration::from_millis(cfg.batch_delay_ms);
        let manager = ConnectionManager {
            inner: inner.clone(),
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.destroyed.load(Ordering::SeqCst) {
                return;
            }

            let cfg = inner.config.read().await.clone();
            let streams = inner.streams.read().await.clone();
            let desired_url = match build_stream_url(&cfg.url, &streams) {
                Ok(u) => u,
                Err(_) => return,
            };
            let current = inner.current_url.lock().await.clone();

            if current.as_deref() != Some(desired_url.as_str()) {
                inner.metrics.write().await.stream_operations.modifications += 1;
                inner.metrics.write().await.stream_changes += 1;
                let _ = manager.reconnect().await;
            }
        });
        *batch_guard = Some(handle);
    }

    /// Abort the previous socket's receive and heartbeat tasks. Does not
    /// touch `batch_task`: a batch-mutation timer that is itself in the
    /// middle of calling `reconnect()` (and so, transitively, this method)
    /// must not abort its own task.
    async fn abort_socket_tasks(&self) {
        if let Some(h) = self.inner.recv_task.lock().await.take() {
            h.abort();
        }
        if let Some(h) = self.inner.heartbeat_task.lock().await.take() {
            h.abort();
        }
    }

    async fn abort_tasks(&self) {
        self.abort_socket_tasks().await;
        if let Some(h) = self.inner.batch_task.lock().await.take() {
            h.abort();
        }
    }

    /// Release all resources unconditionally. Any in-flight operation fails
    /// with `Destroyed`; no further events are emitted afterward.
    pub async fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        self.abort_tasks().await;
        *self.inner.writer.lock().await = None;
        *self.inner.state.write().await = ConnectionState::Disconnected;
        self.inner.pending_pings.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::config::RetryPolicy;

    #[tokio::test]
    async fn zero_max_retries_exhausts_on_first_attempt() {
        let mut config = ConnectionConfig::new("wss://example.invalid");
        config.retry = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let manager = ConnectionManager::new(config);

        let err = manager.reconnect().await.unwrap_err();
        assert!(matches!(
            err,
            CollectorError::ReconnectExhausted { attempts: 1 }
        ));
        assert_eq!(manager.state().await, ConnectionState::Error);
    }

    #[tokio::test]
    async fn send_without_connection_fails_not_open() {
        let manager = ConnectionManager::new(ConnectionConfig::new("wss://example.invalid"));
        let err = manager.send(&serde_json::json!({"ping": true})).await.unwrap_err();
        assert!(matches!(err, CollectorError::NotOpen));
    }

    #[tokio::test]
    async fn add_then_remove_stream_updates_metrics_counters() {
        let manager = ConnectionManager::new(ConnectionConfig::new("wss://example.invalid"));
        manager.add_stream("btcusdt@trade").await.unwrap();
        manager.add_stream("btcusdt@trade").await.unwrap(); // no-op
        manager.remove_stream("btcusdt@trade").await.unwrap();

        let metrics = manager.metrics().await;
        assert_eq!(metrics.stream_operations.additions, 1);
        assert_eq!(metrics.stream_operations.removals, 1);
        assert!(manager.active_streams().await.is_empty());
    }
}
