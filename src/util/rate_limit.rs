//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Matchmaking join rate limit
pub const MATCHMAKING_RATE_LIMIT: u32 = 5; // Max 5 find-match attempts per second

/// Per-connection rate limiter state. Relay traffic is deliberately not limited.
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    join_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self {
            join_limiter: create_limiter(MATCHMAKING_RATE_LIMIT),
        }
    }

    /// Check if a find-match attempt is allowed (returns true if allowed)
    pub fn check_join(&self) -> bool {
        self.join_limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_burst_is_capped() {
        let limiter = ConnectionRateLimiter::new();
        let allowed = (0..20).filter(|_| limiter.check_join()).count();
        assert_eq!(allowed, MATCHMAKING_RATE_LIMIT as usize);
    }
}
