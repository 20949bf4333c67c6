use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// GitHub: 5000 requests/hour = ~1.4/sec, we use 10/sec to allow bursts.
pub const GITHUB_DEFAULT_RPS: u32 = 10;

/// A proactive API rate limiter using the governor crate.
///
/// Every GitHub request waits on it, so a burst of first-time directory
/// listings cannot exhaust the quota in one go.
///
/// # Example
///
/// ```ignore
/// use gitfuse::rate_limit::ApiRateLimiter;
///
/// let limiter = ApiRateLimiter::new(10); // 10 requests per second
///
/// // Before each API call:
/// limiter.wait().await;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
    rps: NonZeroU32,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// A value of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner: Arc::new(rate_limiter),
            rps,
        }
    }

    /// Configured requests per second.
    pub fn requests_per_second(&self) -> u32 {
        self.rps.get()
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter")
            .field("rps", &self.rps)
            .finish()
    }
}
