//! Per-operation minimum-interval gates.
//!
//! A [`Throttle`] protects expensive operations such as search, independent
//! of the shared rate limiter: calls for the same key closer together than
//! the minimum interval are rejected outright, never queued.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use musix_core::{Error, Result};

/// Remembers when each key was last admitted.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_invoked: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_invoked: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Binds this throttle to one logical operation.
    pub fn gate(self: &Arc<Self>, key: impl Into<String>) -> ThrottleGate {
        ThrottleGate {
            throttle: Arc::clone(self),
            key: key.into(),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.last_invoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remaining(&self, last: Option<Instant>, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(last?);
        (elapsed < self.min_interval).then(|| self.min_interval - elapsed)
    }

    /// Reports whether a call for `key` would be admitted, without
    /// recording anything.
    pub fn check(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let last = self.records().get(key).copied();
        match self.remaining(last, now) {
            Some(remaining) => Err(rejection(key, remaining)),
            None => Ok(()),
        }
    }

    /// Admits a call for `key` and records it, or rejects it.
    pub fn admit(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        let mut records = self.records();
        if let Some(remaining) = self.remaining(records.get(key).copied(), now) {
            let err = rejection(key, remaining);
            log::debug!("Rate limited: {} endpoint (retry in {:?})", key, remaining);
            return Err(err);
        }
        records.insert(key.to_string(), now);
        Ok(())
    }

    /// Runs `f` if `key` is admitted; otherwise fails without invoking it.
    pub async fn call<F, Fut, T>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit(key)?;
        f().await
    }
}

/// Rejection carrying `ceil(remaining / 1s)` as the retry hint.
fn rejection(key: &str, remaining: Duration) -> Error {
    let retry_after = u64::try_from(remaining.as_millis().div_ceil(1000)).unwrap_or(u64::MAX);
    Error::RateLimitExceeded {
        key: key.to_string(),
        retry_after,
    }
}

/// A [`Throttle`] bound to one key, e.g. `"deezer-search"`.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    throttle: Arc<Throttle>,
    key: String,
}

impl ThrottleGate {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn check(&self) -> Result<()> {
        self.throttle.check(&self.key)
    }

    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.throttle.call(&self.key, f).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(calls: &AtomicUsize) -> impl Future<Output = Result<usize>> + '_ {
        async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_interval_is_rejected() {
        let gate = Arc::new(Throttle::new(Duration::from_millis(500))).gate("k");
        let calls = AtomicUsize::new(0);

        assert_eq!(gate.call(|| counting(&calls)).await, Ok(1));

        let err = gate.call(|| counting(&calls)).await.unwrap_err();
        assert!(err.retry_after().unwrap() > 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(gate.call(|| counting(&calls)).await, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_rounds_up_to_seconds() {
        let throttle = Throttle::new(Duration::from_millis(5000));
        throttle.admit("deezer-chart").unwrap();

        tokio::time::advance(Duration::from_millis(1200)).await;
        let err = throttle.admit("deezer-chart").unwrap_err();
        assert_eq!(
            err,
            Error::RateLimitExceeded {
                key: "deezer-chart".to_string(),
                retry_after: 4,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_does_not_reset_timer() {
        let throttle = Throttle::new(Duration::from_millis(1000));
        throttle.admit("k").unwrap();

        tokio::time::advance(Duration::from_millis(900)).await;
        assert!(throttle.admit("k").is_err());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(throttle.admit("k").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let throttle = Arc::new(Throttle::new(Duration::from_millis(500)));
        let track_a = throttle.gate("spotify-track-/tracks/a");
        let track_b = throttle.gate("spotify-track-/tracks/b");

        assert!(track_a.call(|| async { Ok(()) }).await.is_ok());
        assert!(track_b.call(|| async { Ok(()) }).await.is_ok());
        assert!(track_a.call(|| async { Ok(()) }).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_does_not_record() {
        let gate = Arc::new(Throttle::new(Duration::from_millis(2000))).gate("deezer-search");

        assert!(gate.check().is_ok());
        assert!(gate.check().is_ok());
        assert!(gate.call(|| async { Ok(()) }).await.is_ok());

        let err = gate.check().unwrap_err();
        assert_eq!(err.retry_after(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_errors_pass_through() {
        let gate = Arc::new(Throttle::new(Duration::from_millis(10))).gate("k");
        let result: Result<()> = gate
            .call(|| async {
                Err(Error::Http {
                    status: 500,
                    url: "https://api.deezer.com/chart".to_string(),
                })
            })
            .await;
        assert_eq!(result.unwrap_err().status(), Some(500));
    }
}
