use std::time::{Duration, Instant};

/// Fixed-window request budget for one connection.
///
/// The configuration always declared a request count per window; this
/// enforces it. A limit of zero disables the limiter entirely.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    window_start: Instant,
    used: u32,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            window_start: Instant::now(),
            used: 0,
        }
    }

    /// Returns whether one more frame fits the current window, counting it
    /// if so.
    pub fn admit(&mut self, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.used = 0;
        }
        if self.used < self.limit {
            self.used += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn zero_limit_admits_everything() {
        let mut limiter = RateLimiter::new(0, Duration::from_secs(1));
        let now = Instant::now();
        for _ in 0..10_000 {
            assert!(limiter.admit(now));
        }
    }

    #[test_timeout::timeout]
    fn budget_exhausts_within_a_window() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.admit(now));
        assert!(limiter.admit(now));
        assert!(limiter.admit(now));
        assert!(!limiter.admit(now));
        assert!(!limiter.admit(now + Duration::from_secs(59)));
    }

    #[test_timeout::timeout]
    fn budget_resets_after_the_window() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.admit(start));
        assert!(limiter.admit(start));
        assert!(!limiter.admit(start));
        assert!(limiter.admit(start + Duration::from_secs(10)));
        assert!(limiter.admit(start + Duration::from_secs(11)));
        assert!(!limiter.admit(start + Duration::from_secs(12)));
    }
}
