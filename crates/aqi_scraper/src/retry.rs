//! Attempt budget and randomized backoff between scrape attempts.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_min: Duration, backoff_max: Duration) -> Self {
        let (lo, hi) = if backoff_min <= backoff_max {
            (backoff_min, backoff_max)
        } else {
            (backoff_max, backoff_min)
        };
        Self {
            max_attempts: max_attempts.max(1),
            backoff_min: lo,
            backoff_max: hi,
        }
    }

    /// Policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Randomized wait before the next attempt.
    pub fn backoff<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.backoff_max.is_zero() {
            return Duration::ZERO;
        }
        let lo = self.backoff_min.as_millis() as u64;
        let hi = self.backoff_max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(lo..=hi))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(5))
    }
}
