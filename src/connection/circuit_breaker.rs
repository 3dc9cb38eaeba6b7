//! Rolling-window circuit breaker for `connect()` (spec §4.1 "Circuit breaker").
//!
//! Cooldown length and half-open probe admission are left to the
//! implementation by spec §9's Open Questions — the defaults chosen here are
//! recorded in `DESIGN.md`.

use super::config::CircuitBreakerConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Tracks a rolling window of connect-attempt outcomes and short-circuits
/// `connect()` when the failure rate crosses `failure_threshold`.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: BreakerState,
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a new, closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed,
            window: VecDeque::new(),
            opened_at: None,
        }
    }

    /// Whether a `connect()` attempt may proceed right now. Transitions
    /// `Open` → `HalfOpen` once the cooldown has elapsed, admitting exactly
    /// one probe attempt.
    pub fn allow_attempt(&mut self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false, // a probe is already in flight
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.cooldown {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the outcome of an attempt admitted by [`Self::allow_attempt`].
    pub fn record_outcome(&mut self, success: bool) {
        if self.state == BreakerState::HalfOpen {
            if success {
                self.state = BreakerState::Closed;
                self.window.clear();
            } else {
                self.state = BreakerState::Open;
                self.opened_at = Some(Instant::now());
            }
            return;
        }

        self.window.push_back(success);
        while self.window.len() > self.config.window_size {
            self.window.pop_front();
        }

        let consecutive_failures = self
            .window
            .iter()
            .rev()
            .take_while(|&&ok| !ok)
            .count() as u32;

        if consecutive_failures >= self.config.failure_threshold {
            self.state = BreakerState::Open;
            self.opened_at = Some(Instant::now());
        }
    }

    /// Whether the breaker is currently open (fast-failing `connect()`).
    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            window_size: 10,
            cooldown: Duration::from_millis(50),
        }
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let mut cb = CircuitBreaker::new(config());
        for _ in 0..3 {
            assert!(cb.allow_attempt());
            cb.record_outcome(false);
        }
        assert!(cb.is_open());
        assert!(!cb.allow_attempt());
    }

    #[test]
    fn half_open_probe_closes_on_success() {
        let mut cb = CircuitBreaker::new(config());
        for _ in 0..3 {
            cb.allow_attempt();
            cb.record_outcome(false);
        }
        assert!(cb.is_open());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.allow_attempt()); // half-open probe admitted
        cb.record_outcome(true);
        assert!(!cb.is_open());
        assert!(cb.allow_attempt());
    }

    #[test]
    fn half_open_probe_reopens_on_failure() {
        let mut cb = CircuitBreaker::new(config());
        for _ in 0..3 {
            cb.allow_attempt();
            cb.record_outcome(false);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.allow_attempt());
        cb.record_outcome(false);
        assert!(cb.is_open());
    }
}
