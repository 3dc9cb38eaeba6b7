//! Connection configuration types (spec §3 `ConnectionConfig`).

use std::time::Duration;

/// Exchange-specific extension describing combined-stream multiplexing
/// (spec §3, §4.1 "Stream-set mutations & batching").
#[derive(Debug, Clone)]
pub struct CombinedStreamConfig {
    /// Initial set of stream names to connect with.
    pub streams: Vec<String>,
    /// When `true`, stream-set mutations are coalesced into batched
    /// reconnects rather than applied only on the next explicit `connect`.
    pub auto_manage: bool,
    /// Coalescing window for batched stream mutations, in milliseconds.
    pub batch_delay_ms: u64,
    /// Maximum number of streams a single connection may carry.
    pub max_streams: usize,
}

impl Default for CombinedStreamConfig {
    fn default() -> Self {
        Self {
            streams: Vec::new(),
            auto_manage: true,
            batch_delay_ms: 200,
            max_streams: 1024,
        }
    }
}

/// Reconnect policy: exponential backoff with optional jitter (spec §4.1).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of consecutive reconnect attempts before entering `ERROR`.
    pub max_retries: u32,
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single reconnect delay.
    pub max_delay: Duration,
    /// Multiplicative backoff factor applied per attempt.
    pub backoff_base: f64,
    /// Whether to randomize each delay within `[0.5, 1.5] * computed_delay`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_base: 2.0,
            jitter: true,
        }
    }
}

/// Heartbeat timing (spec §4.1 "Heartbeat").
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between outbound pings while `CONNECTED`.
    pub interval: Duration,
    /// Maximum time to wait for a pong before declaring a heartbeat timeout.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Circuit-breaker thresholds (spec §4.1 "Circuit breaker").
///
/// The exact cooldown and half-open probe policy are left to the
/// implementation by spec §9's Open Questions; see `DESIGN.md` for the
/// chosen defaults.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive-failure count (within the rolling window) that opens the breaker.
    pub failure_threshold: u32,
    /// Size of the rolling window of recent attempts.
    pub window_size: usize,
    /// How long the breaker stays open before allowing a half-open probe.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_size: 10,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Full configuration for a [`crate::connection::manager::ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL (scheme + host[:port]); any path component is discarded by
    /// URL construction (spec §4.1 "URL construction").
    pub url: String,
    /// Deadline for a single `connect()` call.
    pub connect_timeout: Duration,
    /// Heartbeat timing.
    pub heartbeat: HeartbeatConfig,
    /// Reconnect policy.
    pub retry: RetryPolicy,
    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Combined-stream multiplexing configuration.
    pub combined_stream: CombinedStreamConfig,
    /// Optional extra HTTP headers sent with the WebSocket upgrade request.
    pub headers: Vec<(String, String)>,
    /// Optional HTTP(S) proxy URL.
    pub proxy: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            heartbeat: HeartbeatConfig::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            combined_stream: CombinedStreamConfig::default(),
            headers: Vec::new(),
            proxy: None,
        }
    }
}

impl ConnectionConfig {
    /// Construct a configuration pointed at `url` with otherwise-default policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration, per spec §4.1 `connect()`'s `InvalidConfig` contract.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.url.trim().is_empty() {
            return Err(crate::error::CollectorError::InvalidConfig(
                "url must not be empty".into(),
            ));
        }
        if url::Url::parse(&self.url).is_err() {
            return Err(crate::error::CollectorError::InvalidConfig(format!(
                "malformed url: {}",
                self.url
            )));
        }
        if self.combined_stream.max_streams == 0 {
            return Err(crate::error::CollectorError::InvalidConfig(
                "max_streams must be > 0".into(),
            ));
        }
        Ok(())
    }
}
