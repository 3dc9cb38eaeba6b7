//! Exponential backoff with optional jitter (spec §4.1 "Reconnect policy").

use super::config::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// Compute the delay before reconnect attempt `n` (1-indexed), per:
///
/// `min(maxRetryInterval, initialDelay * backoffBase^(n-1))`, optionally
/// scaled by a jitter factor uniform in `[0.5, 1.5]`.
pub fn reconnect_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let scaled_ms =
        policy.initial_delay.as_millis() as f64 * policy.backoff_base.powi(exponent);
    let capped_ms = scaled_ms.min(policy.max_delay.as_millis() as f64);

    let final_ms = if policy.jitter {
        let factor = rand::thread_rng().gen_range(0.5..=1.5);
        capped_ms * factor
    } else {
        capped_ms
    };

    Duration::from_millis(final_ms.max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_without_jitter() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_base: 2.0,
            jitter: false,
        };
        assert_eq!(reconnect_delay(&policy, 1), Duration::from_millis(100));
        assert_eq!(reconnect_delay(&policy, 2), Duration::from_millis(200));
        assert_eq!(reconnect_delay(&policy, 3), Duration::from_millis(400));
    }

    #[test]
    fn caps_at_max_delay() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_base: 2.0,
            jitter: false,
        };
        assert_eq!(reconnect_delay(&policy, 5), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_base: 2.0,
            jitter: true,
        };
        for _ in 0..100 {
            let d = reconnect_delay(&policy, 1);
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1500));
        }
    }
}
