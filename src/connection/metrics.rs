//! Per-connection metrics (spec §3 `ConnectionMetrics`).

use chrono::{DateTime, Utc};

/// Breakdown of stream-set mutations (spec §3 `streamOperations`).
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamOperationCounts {
    /// Real (non-no-op) `addStream` calls.
    pub additions: u64,
    /// Real (non-no-op) `removeStream` calls.
    pub removals: u64,
    /// Coalesced batch reconnects triggered by stream-set mutations.
    pub modifications: u64,
}

/// Counters, gauges, and timestamps updated only from within a
/// [`super::manager::ConnectionManager`] and readable by any observer
/// (spec §3 invariants).
#[derive(Debug, Clone)]
pub struct ConnectionMetrics {
    /// Total messages sent on the connection.
    pub messages_sent: u64,
    /// Total messages received.
    pub messages_received: u64,
    /// Total bytes sent.
    pub bytes_sent: u64,
    /// Total bytes received.
    pub bytes_received: u64,
    /// Monotonically non-decreasing error count (spec §3 invariant).
    pub error_count: u64,
    /// Number of completed reconnects.
    pub reconnect_count: u64,
    /// Number of coalesced stream-set batch reconnects.
    pub stream_changes: u64,
    /// Per-kind stream mutation counters.
    pub stream_operations: StreamOperationCounts,
    /// Exponentially-weighted moving average round-trip time, in milliseconds.
    pub average_rtt_ms: f64,
    /// Current size of the stream set.
    pub active_stream_count: usize,
    /// When the connection last reached `CONNECTED`.
    pub connected_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent send or receive.
    pub last_activity: Option<DateTime<Utc>>,
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self {
            messages_sent: 0,
            messages_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            error_count: 0,
            reconnect_count: 0,
            stream_changes: 0,
            stream_operations: StreamOperationCounts::default(),
            average_rtt_ms: 0.0,
            active_stream_count: 0,
            connected_at: None,
            last_activity: None,
        }
    }
}

/// EWMA smoothing factor applied to each new RTT sample.
const RTT_EWMA_ALPHA: f64 = 0.2;

impl ConnectionMetrics {
    /// Record a successful send of `bytes` bytes.
    pub fn record_send(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
        self.last_activity = Some(Utc::now());
    }

    /// Record a received frame of `bytes` bytes.
    pub fn record_receive(&mut self, bytes: usize) {
        self.messages_received += 1;
        self.bytes_received += bytes as u64;
        self.last_activity = Some(Utc::now());
    }

    /// Record an error; `error_count` never decreases.
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Fold a new RTT sample into the EWMA.
    pub fn record_rtt(&mut self, rtt_ms: f64) {
        if self.average_rtt_ms == 0.0 {
            self.average_rtt_ms = rtt_ms;
        } else {
            self.average_rtt_ms =
                RTT_EWMA_ALPHA * rtt_ms + (1.0 - RTT_EWMA_ALPHA) * self.average_rtt_ms;
        }
    }

    /// Record a transition into `CONNECTED`.
    pub fn record_connected(&mut self) {
        self.connected_at = Some(Utc::now());
    }

    /// Record a completed reconnect.
    pub fn record_reconnect(&mut self) {
        self.reconnect_count += 1;
    }
}
