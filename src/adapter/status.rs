//! Adapter-level status rollup (spec §3 `AdapterStatus`, §4.2 `getStatus`).

use serde::{Deserialize, Serialize};

/// Coarse lifecycle status, distinct from [`crate::connection::ConnectionState`]
/// — an adapter has no `CLOSING` state of its own, folding it into
/// `DISCONNECTED` for external observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterLifecycle {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl From<crate::connection::ConnectionState> for AdapterLifecycle {
    fn from(state: crate::connection::ConnectionState) -> Self {
        use crate::connection::ConnectionState as S;
        match state {
            S::Idle => Self::Idle,
            S::Connecting => Self::Connecting,
            S::Connected => Self::Connected,
            S::Reconnecting => Self::Connecting,
            S::Closing | S::Disconnected => Self::Disconnected,
            S::Error => Self::Error,
        }
    }
}

/// `healthy` / `degraded` / `unhealthy` rollup driven by error classification
/// (spec §4.2 "Error classification", §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Connectivity {
    pub connected: bool,
    pub reconnecting: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Performance {
    pub error_rate: f64,
    pub average_latency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterStatus {
    pub status: AdapterLifecycle,
    pub health: Health,
    pub connectivity: Connectivity,
    pub performance: Performance,
}

/// Rolling error/health accounting kept by an adapter: a bounded window of
/// recent outcomes classified per spec §7, rather than raw lifetime counts,
/// so `health` reflects recent behavior rather than early-life failures.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    window: std::collections::VecDeque<bool>,
    window_size: usize,
    critical_seen: bool,
    auth_failed: bool,
    latency_ewma_ms: f64,
}

const LATENCY_EWMA_ALPHA: f64 = 0.2;
const DEGRADED_ERROR_RATE: f64 = 0.2;
const UNHEALTHY_ERROR_RATE: f64 = 0.5;

impl HealthTracker {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: std::collections::VecDeque::new(),
            window_size,
            critical_seen: false,
            auth_failed: false,
            latency_ewma_ms: 0.0,
        }
    }

    pub fn record_outcome(&mut self, ok: bool) {
        self.window.push_back(ok);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }
    }

    pub fn record_classification(&mut self, class: crate::error::ErrorClass) {
        use crate::error::ErrorClass as C;
        match class {
            C::Critical => self.critical_seen = true,
            C::Auth => self.auth_failed = true,
            _ => {}
        }
        self.record_outcome(!matches!(class, C::Critical | C::Auth | C::DataFormat));
    }

    pub fn record_latency(&mut self, latency_ms: f64) {
        if self.latency_ewma_ms == 0.0 {
            self.latency_ewma_ms = latency_ms;
        } else {
            self.latency_ewma_ms =
                LATENCY_EWMA_ALPHA * latency_ms + (1.0 - LATENCY_EWMA_ALPHA) * self.latency_ewma_ms;
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|ok| !**ok).count();
        failures as f64 / self.window.len() as f64
    }

    pub fn health(&self) -> Health {
        if self.critical_seen || self.auth_failed || self.error_rate() >= UNHEALTHY_ERROR_RATE {
            Health::Unhealthy
        } else if self.error_rate() >= DEGRADED_ERROR_RATE {
            Health::Degraded
        } else {
            Health::Healthy
        }
    }

    pub fn average_latency_ms(&self) -> f64 {
        self.latency_ewma_ms
    }
}
