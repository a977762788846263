//! Per-request governance knobs.

use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Default lifetime of a cached response (5 minutes).
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_millis(300_000);

/// Default number of requests admitted per domain per window.
pub const DEFAULT_RATE_LIMIT: u32 = 50;

/// Default rate-limit window (1 minute).
pub const DEFAULT_TIME_WINDOW: Duration = Duration::from_millis(60_000);

/// Controls how the governor treats one request.
///
/// When `domain` is `None` the rate-limit bucket is the request URL's host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestControls {
    pub retries: u32,
    pub retry_delay: Duration,
    pub cache_time: Duration,
    pub domain: Option<String>,
    pub rate_limit: u32,
    pub time_window: Duration,
}

impl Default for RequestControls {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            cache_time: DEFAULT_CACHE_TIME,
            domain: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            time_window: DEFAULT_TIME_WINDOW,
        }
    }
}

impl RequestControls {
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Admit at most `rate_limit` requests per `time_window` for the domain.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: u32, time_window: Duration) -> Self {
        self.rate_limit = rate_limit;
        self.time_window = time_window;
        self
    }
}
