//! The request governor: rate limiting, caching, queueing and retry
//! composed into a single call.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use reqwest::Url;
use serde_json::Value;

use musix_core::{cache_key, Error, RequestControls, RequestOptions, Result};

use crate::backoff::JitteredBackoff;
use crate::cache::ResponseCache;
use crate::queue::{RequestQueue, DEFAULT_CONCURRENCY};
use crate::rate_limiter::RateLimiter;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Keeps API traffic within third-party rate limits while avoiding
/// redundant network calls.
///
/// One governor is typically owned by the application's composition root
/// and shared behind an [`Arc`]; independent governors (one per provider,
/// one per test) share nothing.
#[derive(Debug)]
pub struct Governor {
    transport: Arc<dyn Transport>,
    rate_limiter: RateLimiter,
    cache: ResponseCache<Value>,
    queue: RequestQueue,
}

impl Governor {
    /// Create a governor with the default concurrency of 5.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_concurrency(transport, DEFAULT_CONCURRENCY)
    }

    pub fn with_concurrency(transport: Arc<dyn Transport>, concurrency: usize) -> Self {
        Self {
            transport,
            rate_limiter: RateLimiter::new(),
            cache: ResponseCache::new(),
            queue: RequestQueue::new(concurrency),
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        &self.cache
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Perform a governed request and return its JSON payload.
    ///
    /// 1. The domain's rate-limit window is consulted; a rejection fails
    ///    immediately with [`Error::RateLimitExceeded`].
    /// 2. GET requests are answered from the response cache when fresh.
    /// 3. Otherwise the fetch runs on the request queue, retrying transient
    ///    failures with jittered exponential backoff. Successful GET
    ///    payloads are cached for `controls.cache_time`.
    ///
    /// Empty responses (204, 205, blank body) yield [`Value::Null`].
    pub async fn request(
        &self,
        url: &str,
        options: &RequestOptions,
        controls: &RequestControls,
    ) -> Result<Value> {
        let domain = match &controls.domain {
            Some(domain) => domain.clone(),
            None => host_of(url)?,
        };

        if !self
            .rate_limiter
            .should_allow(&domain, controls.rate_limit, controls.time_window)
        {
            log::warn!("Rate limit exceeded for {}", domain);
            let retry_after = self
                .rate_limiter
                .retry_after(&domain)
                .map_or(0, whole_seconds);
            return Err(Error::RateLimitExceeded {
                key: domain,
                retry_after,
            });
        }

        let key = options.is_cacheable().then(|| cache_key(url, options));
        if let Some(key) = &key {
            if let Some(payload) = self.cache.get(key) {
                log::debug!("Cache hit for {}", url);
                return Ok(payload);
            }
        }

        // Cancelling drops the queued task wherever it is: waiting for a
        // slot, mid-send, or sleeping between attempts.
        let queued = self
            .queue
            .add(|| self.fetch_with_retry(url, options, controls));
        let payload = match &options.signal {
            Some(signal) => {
                tokio::select! {
                    biased;
                    () = signal.cancelled() => {
                        log::debug!("Request to {} aborted", url);
                        return Err(Error::Aborted { url: url.to_string() });
                    }
                    result = queued => result?,
                }
            }
            None => queued.await?,
        };

        if let Some(key) = key {
            self.cache.set(key, payload.clone(), controls.cache_time);
        }
        Ok(payload)
    }

    /// Cache-only request: no rate limiting, no queueing, one attempt.
    ///
    /// Shares the response cache with [`request`](Self::request).
    pub async fn cached_fetch(
        &self,
        url: &str,
        options: &RequestOptions,
        cache_time: Duration,
    ) -> Result<Value> {
        let key = cache_key(url, options);
        if let Some(payload) = self.cache.get(&key) {
            log::debug!("Cache hit for {}", url);
            return Ok(payload);
        }

        match self.fetch_once(url, options).await {
            Ok(payload) => {
                self.cache.set(key, payload.clone(), cache_time);
                Ok(payload)
            }
            Err(e) => {
                log::error!("Error fetching {}: {}", url, e);
                Err(e)
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        url: &str,
        options: &RequestOptions,
        controls: &RequestControls,
    ) -> Result<Value> {
        let mut attempt = 0_u32;
        let result = (|| {
            attempt += 1;
            self.fetch_once(url, options)
        })
        .retry(JitteredBackoff::new(controls.retry_delay, controls.retries))
        .sleep(tokio::time::sleep)
        .when(Error::is_retryable)
        .notify(|err: &Error, delay: Duration| {
            log::warn!(
                "Attempt failed for {}: {} (retrying in {:?})",
                url,
                err,
                delay
            );
        })
        .await;

        if let Err(e) = &result {
            if e.is_retryable() {
                log::error!("Giving up on {} after {} attempts: {}", url, attempt, e);
            } else if !matches!(e.status(), Some(401 | 403 | 404)) {
                log::warn!("Request to {} failed: {}", url, e);
            }
        }
        result
    }

    /// One network attempt, honouring the caller's abort signal.
    async fn fetch_once(&self, url: &str, options: &RequestOptions) -> Result<Value> {
        let request = HttpRequest::new(url, options);
        let send = self.transport.send(&request);

        let response = match &options.signal {
            Some(signal) => {
                tokio::select! {
                    biased;
                    () = signal.cancelled() => {
                        return Err(Error::Aborted { url: url.to_string() });
                    }
                    response = send => response?,
                }
            }
            None => send.await?,
        };

        decode(url, &response)
    }
}

fn decode(url: &str, response: &HttpResponse) -> Result<Value> {
    if !response.is_success() {
        return Err(Error::Http {
            status: response.status,
            url: url.to_string(),
        });
    }
    if response.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body).map_err(|e| Error::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Hostname of `url`, used as the default rate-limit bucket.
pub fn host_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidUrl {
            url: url.to_string(),
            message: "URL has no host".to_string(),
        })
}

fn whole_seconds(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis().div_ceil(1000)).unwrap_or(u64::MAX)
}
