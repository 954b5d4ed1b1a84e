//! Per-minute request budget for metered upstream APIs.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Shared token bucket; clones draw from the same budget.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Budget of `requests_per_minute`, floored at one.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let n = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(GovLimiter::direct(Quota::per_minute(n))),
        }
    }

    /// Wait until a request slot is available.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a slot without waiting. Returns true if acquired.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhausts_and_is_shared() {
        let limiter = RateLimiter::per_minute(2);
        let clone = limiter.clone();
        assert!(limiter.try_acquire());
        assert!(clone.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_zero_budget_floors_to_one() {
        let limiter = RateLimiter::per_minute(0);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
