//! Retry timing for the confirm-and-relay cycle
//!
//! A failed relay puts the transfer back into confirmation polling. By default
//! the cycle restarts after the fixed poll interval and never gives up. A
//! multiplier above 1.0 turns this into exponential backoff capped at
//! `max_backoff`, and `max_attempts` bounds the number of failed cycles.

use std::time::Duration;

use crate::config::RelayConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry, and the confirmation poll interval
    pub interval: Duration,
    /// Failed relay cycles allowed before the transfer is abandoned
    pub max_attempts: Option<u32>,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Fixed interval, unbounded attempts
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            backoff_multiplier: 1.0,
            max_backoff: interval,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_attempts,
            backoff_multiplier: config.backoff_multiplier,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before retrying after `failures` failed cycles (1-indexed)
    pub fn delay_after_failure(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.interval.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        // The cap never shortens the base interval
        let cap = self.max_backoff.max(self.interval).as_secs_f64();
        Duration::from_secs_f64(secs.min(cap))
    }

    /// Whether another cycle is allowed after `failures` failed ones
    pub fn should_retry(&self, failures: u32) -> bool {
        match self.max_attempts {
            Some(max) => failures < max,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(Duration::from_secs(30));

        assert_eq!(policy.delay_after_failure(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after_failure(7), Duration::from_secs(30));
        assert!(policy.should_retry(1_000_000));
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy {
            interval: Duration::from_secs(2),
            max_attempts: Some(5),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
        };

        assert_eq!(policy.delay_after_failure(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after_failure(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after_failure(3), Duration::from_secs(8));
        assert_eq!(policy.delay_after_failure(5), Duration::from_secs(32));
        assert_eq!(policy.delay_after_failure(6), Duration::from_secs(60)); // capped
    }

    #[test]
    fn test_attempt_cap() {
        let policy = RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::fixed(Duration::from_secs(1))
        };

        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_from_config_defaults_to_fixed() {
        let config = RelayConfig {
            poll_interval_ms: 30_000,
            min_amount: 100,
            max_attempts: None,
            backoff_multiplier: 1.0,
            max_backoff_ms: 600_000,
            claim_markers: false,
        };
        let policy = RetryPolicy::from_config(&config);

        assert_eq!(policy.delay_after_failure(12), Duration::from_secs(30));
        assert!(policy.should_retry(u32::MAX - 1));
    }
}
