//! Reactive rate limiting
//!
//! The limiter stays out of the way until the backend answers 429. From then
//! on every request waits for a `governor` permit at the configured rate.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, warn};

/// Dormant-until-429 limiter shared by all requests of a runtime.
pub struct ReactiveLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    active: AtomicBool,
    per_second: u32,
}

impl ReactiveLimiter {
    /// Create a limiter that allows `per_second` requests once active.
    pub fn new(per_second: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            active: AtomicBool::new(false),
            per_second: rate.get(),
        }
    }

    /// Start throttling. Called when the server reports 429.
    pub fn activate(&self) {
        let was_active = self.active.swap(true, Ordering::SeqCst);
        if !was_active {
            warn!(
                "Rate limited by server, throttling to {} requests/second",
                self.per_second
            );
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn per_second(&self) -> u32 {
        self.per_second
    }

    /// Wait for permission if throttling is active.
    pub async fn wait_if_active(&self) {
        if self.is_active() {
            debug!("Waiting for rate limiter permit");
            self.limiter.until_ready().await;
        }
    }
}

impl Default for ReactiveLimiter {
    fn default() -> Self {
        Self::new(10)
    }
}
