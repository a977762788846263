//! Provider-aware API client on top of the [`Governor`].
//!
//! An [`ApiClient`] turns endpoint paths into governed requests: it builds
//! the URL, attaches headers and bearer tokens, applies the provider's
//! per-endpoint throttles and limits, replays once after a token refresh,
//! and walks the provider's proxy chain when one is configured.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::form_urlencoded;

use musix_core::{Error, RequestControls, RequestOptions, Result};

use crate::cache::{MemoryCache, DEFAULT_MEMORY_CACHE_CAPACITY};
use crate::governor::Governor;
use crate::provider::{EndpointClass, ProviderProfile};
use crate::throttle::Throttle;

/// Supplies bearer tokens for authenticated providers.
#[async_trait]
pub trait TokenProvider: Debug + Send + Sync {
    /// The current access token, if the user is signed in.
    async fn token(&self) -> Option<String>;

    /// Obtain a fresh token after the provider answered 401.
    async fn refresh(&self) -> Option<String> {
        None
    }

    /// Called when a 401 could not be recovered by refreshing.
    fn on_auth_failure(&self, _error: &Error) {}
}

/// A fixed token with no refresh capability.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Governed client for one provider.
#[derive(Debug)]
pub struct ApiClient {
    governor: Arc<Governor>,
    profile: ProviderProfile,
    tokens: Option<Arc<dyn TokenProvider>>,
    throttles: HashMap<Duration, Arc<Throttle>>,
    memory: MemoryCache<Value>,
}

impl ApiClient {
    pub fn new(governor: Arc<Governor>, profile: ProviderProfile) -> Self {
        let mut throttles = HashMap::new();
        for policy in profile.policies.values() {
            if let Some(throttle) = &policy.throttle {
                throttles
                    .entry(throttle.min_interval)
                    .or_insert_with(|| Arc::new(Throttle::new(throttle.min_interval)));
            }
        }

        Self {
            governor,
            profile,
            tokens: None,
            throttles,
            memory: MemoryCache::new(DEFAULT_MEMORY_CACHE_CAPACITY),
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    pub fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    /// Full URL for `endpoint` with `params` appended as a query string.
    pub fn url_for<K, V>(&self, endpoint: &str, params: &[(K, V)]) -> String
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = if is_absolute(endpoint) {
            endpoint.to_string()
        } else {
            format!("{}{}", self.profile.base_url, endpoint)
        };

        if !params.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
        url
    }

    /// GET `endpoint` with query `params`.
    pub async fn get<K, V>(&self, endpoint: &str, params: &[(K, V)]) -> Result<Value>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.request(endpoint, &RequestOptions::new(), params).await
    }

    /// Perform a governed request against the provider.
    ///
    /// Throttled endpoint classes are rejected with
    /// [`Error::RateLimitExceeded`] before anything else happens.
    pub async fn request<K, V>(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        params: &[(K, V)],
    ) -> Result<Value>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = self.url_for(endpoint, params);
        let controls = self.profile.controls_for(endpoint);
        let policy = self.profile.policy(EndpointClass::classify(endpoint));

        let throttle = policy.throttle.as_ref().and_then(|policy| {
            self.throttles
                .get(&policy.min_interval)
                .map(|throttle| (throttle, policy.key.resolve(endpoint)))
        });

        match throttle {
            Some((throttle, key)) => {
                throttle
                    .call(&key, || self.dispatch(&url, options, &controls))
                    .await
            }
            None => self.dispatch(&url, options, &controls).await,
        }
    }

    /// Answer from the client's memory cache, or run `fetch` and remember
    /// its result.
    pub async fn memoized<F, Fut>(&self, key: &str, max_age: Duration, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(value) = self.memory.get(key, max_age) {
            log::debug!("Memory cache hit for {}", key);
            return Ok(value);
        }
        let value = fetch().await?;
        self.memory.insert(key, value.clone());
        Ok(value)
    }

    async fn dispatch(
        &self,
        url: &str,
        options: &RequestOptions,
        controls: &RequestControls,
    ) -> Result<Value> {
        if self.profile.proxies.is_empty() {
            return self.execute(url, options, controls).await;
        }

        let mut last_error = None;
        for base in &self.profile.proxies {
            let proxied = proxy_url(base, url);
            match self.execute(&proxied, options, controls).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() || matches!(e, Error::Aborted { .. }) => {
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("Proxy {} failed for {}: {}", base, url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Network {
            url: url.to_string(),
            message: "all proxies failed".to_string(),
        }))
    }

    /// Sends once, and again with a refreshed token after a 401.
    async fn execute(
        &self,
        url: &str,
        options: &RequestOptions,
        controls: &RequestControls,
    ) -> Result<Value> {
        let err = match self.send(url, options, controls, None).await {
            Err(e) if e.status() == Some(401) => e,
            other => return other,
        };

        let Some(tokens) = &self.tokens else {
            return Err(err);
        };
        match tokens.refresh().await {
            Some(token) => {
                log::info!("Retrying {} with a refreshed token", url);
                self.send(url, options, controls, Some(token)).await
            }
            None => {
                tokens.on_auth_failure(&err);
                Err(err)
            }
        }
    }

    async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
        controls: &RequestControls,
        token: Option<String>,
    ) -> Result<Value> {
        let mut options = options.clone();
        options
            .headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| "application/json".to_string());

        if self.profile.requires_auth {
            let token = match token {
                Some(token) => Some(token),
                None => match &self.tokens {
                    Some(tokens) => tokens.token().await,
                    None => None,
                },
            };
            let Some(token) = token else {
                return Err(Error::Unauthenticated {
                    url: url.to_string(),
                });
            };
            options
                .headers
                .insert("Authorization".to_string(), format!("Bearer {token}"));
        }

        self.governor.request(url, &options, controls).await
    }
}

fn is_absolute(endpoint: &str) -> bool {
    let has_scheme = |scheme: &str| {
        endpoint
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    };
    has_scheme("http://") || has_scheme("https://")
}

/// Route `target` through a proxy base. Bases ending in a query expect the
/// target percent-encoded.
pub fn proxy_url(base: &str, target: &str) -> String {
    if base.contains('?') {
        let encoded: String = form_urlencoded::byte_serialize(target.as_bytes()).collect();
        format!("{base}{encoded}")
    } else {
        format!("{base}{target}")
    }
}
