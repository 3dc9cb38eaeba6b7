//! Connection-level events, dispatched via an explicit listener set.
//!
//! The source system's event emitter is modeled here as a `tokio::sync::broadcast`
//! channel, the same mechanism `dhan_rs::ws::manager::DhanFeedManager` uses to
//! fan out parsed ticks to subscriber tasks. Broadcast receivers are weak,
//! non-owning handles (spec §9 "WeakRef / weak handles for observer
//! back-references") — a `ConnectionManager` never blocks or errors because
//! no one is listening; `send` on a channel with no receivers is a no-op.

use super::state::ConnectionState;
use tokio::sync::broadcast;

/// An event emitted by a [`super::manager::ConnectionManager`].
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The connection transitioned from `from` to `to`. Never emitted for a
    /// same-state "transition" (spec invariant #1 in §8).
    StatusChange {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// `connect()` reached `CONNECTED`.
    Connected,
    /// The socket closed or `disconnect()` completed.
    Disconnected,
    /// `disconnect()` was requested and is in flight.
    Disconnecting,
    /// A reconnect attempt is starting.
    Reconnecting { attempt: u32 },
    /// A reconnect attempt succeeded.
    Reconnected,
    /// A heartbeat pong was not observed within the configured timeout.
    HeartbeatTimeout,
    /// A recoverable or terminal error occurred; carries a human-readable cause.
    Error { message: String },
    /// The stream set changed by `additions` new streams and `removals` removed.
    StreamsChanged { additions: usize, removals: usize },
    /// A text frame was received. Adapters subscribe to this to drive
    /// `parseMessage` (spec §4.2); binary frames are not forwarded here.
    Message { payload: String },
}

/// Default broadcast channel capacity for connection events.
///
/// Sized generously relative to the expected event rate (state transitions
/// and stream-set changes, not per-message traffic) so a slow subscriber
/// does not immediately start missing events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Thin wrapper around a `broadcast::Sender` giving call sites a single,
/// named place to emit from — mirrors how `DhanFeedManager` keeps a
/// `parsed_tx` field per connection rather than scattering `channel()` calls.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<ConnectionEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the default channel capacity.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe a new listener. Listeners that never poll are dropped
    /// silently when the channel's capacity is exceeded (lagged), per the
    /// "tolerate observer absence" design note.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers. A send with zero
    /// subscribers is not an error.
    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
