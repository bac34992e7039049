// src/engine/rate.rs

//! Sliding-window limit on task starts.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Allows at most `capacity` dispatches in any one-second window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    capacity: usize,
    starts: VecDeque<Instant>,
}

impl RateLimiter {
    /// `None` when `rate` disables limiting (zero, negative or not finite).
    ///
    /// Fractional rates round down, with a floor of one start per window.
    pub fn per_second(rate: f64) -> Option<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return None;
        }
        let capacity = (rate.floor() as usize).max(1);
        Some(Self {
            capacity,
            starts: VecDeque::with_capacity(capacity),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.starts.front() {
            if now.saturating_duration_since(oldest) >= WINDOW {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a start at `now` if the window has room.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.evict(now);
        if self.starts.len() < self.capacity {
            self.starts.push_back(now);
            true
        } else {
            false
        }
    }

    /// When the oldest start leaves the window.
    pub fn next_available(&mut self, now: Instant) -> Instant {
        self.evict(now);
        if self.starts.len() < self.capacity {
            return now;
        }
        self.starts.front().map_or(now, |&oldest| oldest + WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_for_non_positive_rates() {
        assert!(RateLimiter::per_second(0.0).is_none());
        assert!(RateLimiter::per_second(-3.0).is_none());
        assert!(RateLimiter::per_second(f64::NAN).is_none());
        assert_eq!(RateLimiter::per_second(0.5).map(|r| r.capacity()), Some(1));
    }

    #[test]
    fn window_slides() {
        let start = Instant::now();
        let mut limiter = RateLimiter::per_second(2.0).expect("enabled");

        assert!(limiter.try_acquire(start));
        assert!(limiter.try_acquire(start + Duration::from_millis(100)));
        assert!(!limiter.try_acquire(start + Duration::from_millis(200)));
        assert_eq!(
            limiter.next_available(start + Duration::from_millis(200)),
            start + WINDOW
        );

        assert!(limiter.try_acquire(start + WINDOW));
        assert!(!limiter.try_acquire(start + WINDOW));
    }
}
