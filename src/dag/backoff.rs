// src/dag/backoff.rs

//! Retry backoff policy.
//!
//! The delay before retry `n` (0-indexed, i.e. after attempt `n + 1` failed)
//! is `base × multiplier^n`, clamped to `max`. There is no jitter: delays are
//! a pure function of the retry index so scheduling stays replayable.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Multiplicative growth factor (validated `>= 1.0` when loaded from a plan).
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    /// 10ms doubling per retry, capped at 30s.
    fn default() -> Self {
        Self {
            base: Duration::from_millis(10),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base,
            multiplier,
            max,
        }
    }

    /// No delay between attempts.
    pub fn immediate() -> Self {
        Self {
            base: Duration::ZERO,
            multiplier: 1.0,
            max: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0 = first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_uses_base() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), 2.0, Duration::from_secs(30));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
    }

    #[test]
    fn grows_exponentially() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), 2.0, Duration::from_secs(30));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn clamps_to_max() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), 2.0, Duration::from_secs(1));
        assert_eq!(policy.delay_for(10), Duration::from_secs(1));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn base_above_max_is_clamped() {
        let policy = BackoffPolicy::new(Duration::from_secs(10), 1.0, Duration::from_secs(5));
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
    }

    #[test]
    fn immediate_never_waits() {
        let policy = BackoffPolicy::immediate();
        for retry in 0..5 {
            assert_eq!(policy.delay_for(retry), Duration::ZERO);
        }
    }
}
