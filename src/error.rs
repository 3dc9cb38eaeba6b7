//! Error types for the `marketfeed-collector` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, CollectorError>`.
//!
//! [`CollectorError`] covers connection-manager failures (§4.1), adapter and
//! registry lifecycle failures (§4.2, §4.5), and the transport errors
//! (`WebSocket`, `Json`, `Http`, `Url`) those operations propagate.

use std::fmt;

/// All possible errors produced by the collector core.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// A suspending operation did not complete before its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Connection configuration failed validation (e.g. empty or malformed URL).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The WebSocket handshake or initial connect attempt failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// An operation requiring an open connection was attempted while not connected.
    #[error("connection is not open")]
    NotOpen,

    /// `addStream` would exceed the configured stream limit.
    #[error("stream limit reached ({max} streams)")]
    StreamLimitReached {
        /// The configured maximum.
        max: usize,
    },

    /// The reconnect policy exhausted its configured attempt budget.
    #[error("reconnect exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The circuit breaker is open; `connect()` failed fast without dialing.
    #[error("circuit breaker open")]
    CircuitOpen,

    /// The component was destroyed while the operation was in flight.
    #[error("destroyed")]
    Destroyed,

    /// A transient network condition (reset, simulated loss, DNS failure).
    #[error("network issue: {0}")]
    NetworkIssue(String),

    /// A WebSocket-level error from `tokio-tungstenite`.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Failed to serialize or deserialize a JSON payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A network or transport-level error from `reqwest` (publish path).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// No registry entry or instance exists under the given name.
    #[error("not found: {0}")]
    NotFound(String),

    /// `register()` was called again for a name bound to a different factory.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// `createInstance`/`startInstance` was called for a name already running.
    #[error("already running: {0}")]
    AlreadyRunning(String),

    /// `stopInstance` was called for a name that is not running.
    #[error("not running: {0}")]
    NotRunning(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Coarse-grained classification of a [`CollectorError`], per spec §7.
///
/// Drives `AdapterStatus.health` and determines whether an error is
/// recoverable by the reconnect/backoff policy, requires operator action, or
/// is absorbed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Connect failure, DNS failure, reset, read/write error, heartbeat timeout.
    Network,
    /// Server signaled over-quota; back off with increased delay.
    RateLimit,
    /// Invalid credentials or signature; fatal per instance, no auto-retry.
    Auth,
    /// Malformed frame or JSON parse error; logged and dropped, never fatal.
    DataFormat,
    /// Memory or connection-count limits exceeded; triggers degradation.
    Resource,
    /// Internal invariant violation; instance stopped and marked unhealthy.
    Critical,
    /// Sustained but non-fatal condition (e.g. repeated `DataFormat` drops).
    Warning,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::RateLimit => "rateLimit",
            Self::Auth => "auth",
            Self::DataFormat => "dataFormat",
            Self::Resource => "resource",
            Self::Critical => "critical",
            Self::Warning => "warning",
        };
        f.write_str(s)
    }
}

impl CollectorError {
    /// Classify this error per the §7 taxonomy.
    ///
    /// This is a default, context-free classification; adapters may refine
    /// it (e.g. an HTTP 429 body maps to `RateLimit`, not plain `Network`).
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::Timeout
            | Self::ConnectFailed(_)
            | Self::NetworkIssue(_)
            | Self::WebSocket(_)
            | Self::ReconnectExhausted { .. }
            | Self::CircuitOpen
            | Self::NotOpen
            | Self::Http(_) => ErrorClass::Network,

            Self::Json(_) | Self::Url(_) => ErrorClass::DataFormat,

            Self::StreamLimitReached { .. } => ErrorClass::Resource,

            Self::InvalidConfig(_)
            | Self::NotFound(_)
            | Self::AlreadyRegistered(_)
            | Self::AlreadyRunning(_)
            | Self::NotRunning(_) => ErrorClass::Critical,

            Self::Destroyed => ErrorClass::Warning,
        }
    }
}
