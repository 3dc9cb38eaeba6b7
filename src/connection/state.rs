//! Connection state machine (spec §3 `ConnectionState`, §4.1 "State machine").

/// One of the states a [`crate::connection::manager::ConnectionManager`] can be in.
///
/// Transitions are monotonic within a connect attempt — the invariant
/// enforced by [`super::manager::ConnectionManager`] is that no state is
/// ever observed twice in a row via a `statusChange`-equivalent event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected, or fully reset by `destroy()`.
    Idle,
    /// `connect()` in flight, socket not yet open.
    Connecting,
    /// Socket open and usable.
    Connected,
    /// Lost connection, backoff/retry loop in progress.
    Reconnecting,
    /// `disconnect()` in flight, waiting for the socket to close.
    Closing,
    /// Cleanly disconnected; not connecting.
    Disconnected,
    /// Reconnect attempts exhausted, or a non-recoverable failure occurred.
    /// Recoverable only via a subsequent `connect()`.
    Error,
}

impl ConnectionState {
    /// Human-readable, stable name used in logs and HTTP responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Reconnecting => "RECONNECTING",
            Self::Closing => "CLOSING",
            Self::Disconnected => "DISCONNECTED",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
