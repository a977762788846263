//! Per-domain fixed-window rate limiter.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct RateBucket {
    request_count: u32,
    window_reset_at: Instant,
}

impl RateBucket {
    fn open(now: Instant, time_window: Duration) -> Self {
        Self {
            request_count: 1,
            window_reset_at: now + time_window,
        }
    }
}

/// Admits or rejects requests per domain under a fixed-window counter.
///
/// Window parameters are supplied on every call. The call that opens a
/// window fixes when it resets; `max_requests` is compared per call, so
/// callers sharing a domain with different budgets each see their own
/// ceiling against the shared count.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, RateBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<String, RateBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether one more request to `domain` fits in its window.
    ///
    /// Rejections leave the count untouched.
    pub fn should_allow(&self, domain: &str, max_requests: u32, time_window: Duration) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets();

        let Some(bucket) = buckets.get_mut(domain) else {
            buckets.insert(domain.to_string(), RateBucket::open(now, time_window));
            return true;
        };

        if now > bucket.window_reset_at {
            *bucket = RateBucket::open(now, time_window);
            return true;
        }

        if bucket.request_count < max_requests {
            bucket.request_count += 1;
            return true;
        }

        false
    }

    /// Time left until the current window for `domain` resets.
    ///
    /// Returns `None` when the domain has no bucket or its window has
    /// already elapsed.
    pub fn retry_after(&self, domain: &str) -> Option<Duration> {
        let now = Instant::now();
        self.buckets()
            .get(domain)
            .map(|bucket| bucket.window_reset_at.saturating_duration_since(now))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Requests admitted in the current window for `domain`.
    pub fn request_count(&self, domain: &str) -> Option<u32> {
        self.buckets().get(domain).map(|bucket| bucket.request_count)
    }
}
