//! Exponential backoff with multiplicative jitter.

use std::time::Duration;

use rand::Rng;

/// Lower bound of the jitter factor.
const JITTER_MIN: f64 = 0.8;

/// Width of the jitter range; factors fall in `[0.8, 1.2)`.
const JITTER_SPAN: f64 = 0.4;

/// Delay before retry number `attempt` (zero-based) for a given jitter
/// factor: `base * 2^attempt * factor`.
pub fn backoff_delay(base: Duration, attempt: u32, factor: f64) -> Duration {
    let exponential = base.saturating_mul(2_u32.saturating_pow(attempt));
    Duration::try_from_secs_f64(exponential.as_secs_f64() * factor.max(0.0))
        .unwrap_or(Duration::MAX)
}

/// Yields one jittered delay per permitted retry.
///
/// Used as a `backon` backoff: the iterator ending is what stops the
/// retry loop, so a request is attempted at most `1 + retries` times.
#[derive(Debug, Clone)]
pub struct JitteredBackoff {
    base: Duration,
    retries: u32,
    attempt: u32,
}

impl JitteredBackoff {
    pub fn new(base: Duration, retries: u32) -> Self {
        Self {
            base,
            retries,
            attempt: 0,
        }
    }
}

impl Iterator for JitteredBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.retries {
            return None;
        }
        let factor = JITTER_MIN + rand::rng().random::<f64>() * JITTER_SPAN;
        let delay = backoff_delay(self.base, self.attempt, factor);
        self.attempt += 1;
        Some(delay)
    }
}
