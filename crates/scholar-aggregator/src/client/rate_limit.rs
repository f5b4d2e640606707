//! Per-source request gate.
//!
//! Every outbound attempt to a source, retries included, waits here first.
//! The gate is a GCRA limiter with a burst of one, so consecutive requests
//! are spaced by at least `1/R` no matter how many tasks share it.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GcraLimiter};
use tracing::trace;

type DirectLimiter = GcraLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared, cloneable request gate for one source.
#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    interval: Duration,
    inner: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Create a gate allowing `requests_per_second` requests (minimum 1).
    #[must_use]
    pub fn per_second(name: &'static str, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let interval = Duration::from_secs(1) / rate.get();
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(rate))
            .allow_burst(NonZeroU32::MIN);

        Self { name, interval, inner: Arc::new(GcraLimiter::direct(quota)) }
    }

    /// Wait until the next request may be sent.
    pub async fn acquire(&self) {
        if self.inner.check().is_ok() {
            return;
        }
        trace!(source = self.name, interval_ms = self.interval.as_millis() as u64, "waiting for rate gate");
        self.inner.until_ready().await;
    }

    /// Minimum spacing between two requests.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish()
    }
}
