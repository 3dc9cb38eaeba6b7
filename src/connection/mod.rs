//! The connection layer (spec §4.1, component A "Connection Manager").
//!
//! [`manager::ConnectionManager`] is the only stateful type here; every
//! other submodule is a small, independently-testable piece it composes:
//! configuration, the state machine, the event emitter, the stream set,
//! metrics, URL construction, backoff, and the circuit breaker.

pub mod backoff;
pub mod circuit_breaker;
pub mod config;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod state;
pub mod stream_set;
pub mod url;

pub use circuit_breaker::CircuitBreaker;
pub use config::{
    CircuitBreakerConfig, CombinedStreamConfig, ConnectionConfig, HeartbeatConfig, RetryPolicy,
};
pub use events::{ConnectionEvent, EventEmitter};
pub use manager::ConnectionManager;
pub use metrics::{ConnectionMetrics, StreamOperationCounts};
pub use state::ConnectionState;
pub use stream_set::StreamSet;
