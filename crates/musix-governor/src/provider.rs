//! Per-provider request policies.
//!
//! Each third-party API gets a [`ProviderProfile`] describing where it
//! lives, how hard it may be hit and which operations are throttled.
//! Presets exist for Spotify, Deezer and Genius.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use musix_core::controls::{DEFAULT_CACHE_TIME, DEFAULT_RATE_LIMIT, DEFAULT_TIME_WINDOW};
use musix_core::RequestControls;

/// Coarse category of an endpoint, used to pick its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EndpointClass {
    Search,
    Browse,
    Chart,
    Track,
    Default,
}

impl EndpointClass {
    /// Classify an endpoint path by the segments the providers use.
    pub fn classify(endpoint: &str) -> Self {
        if endpoint.contains("/search") {
            Self::Search
        } else if endpoint.contains("/browse") {
            Self::Browse
        } else if endpoint.contains("/chart") {
            Self::Chart
        } else if endpoint.contains("/tracks") {
            Self::Track
        } else {
            Self::Default
        }
    }
}

/// How throttle gates are keyed for an endpoint class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleKey {
    /// Every call in the class shares one key, e.g. `"deezer-search"`.
    Shared(String),
    /// Each endpoint gets its own key: the prefix followed by the endpoint.
    PerEndpoint(String),
}

impl ThrottleKey {
    pub fn resolve(&self, endpoint: &str) -> String {
        match self {
            Self::Shared(key) => key.clone(),
            Self::PerEndpoint(prefix) => format!("{prefix}{endpoint}"),
        }
    }
}

/// Minimum spacing between calls of one endpoint class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub min_interval: Duration,
    pub key: ThrottleKey,
}

/// Rate limit, cache lifetime and throttle for one endpoint class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPolicy {
    pub rate_limit: u32,
    pub time_window: Duration,
    pub cache_time: Duration,
    pub throttle: Option<ThrottlePolicy>,
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        Self {
            rate_limit: DEFAULT_RATE_LIMIT,
            time_window: DEFAULT_TIME_WINDOW,
            cache_time: DEFAULT_CACHE_TIME,
            throttle: None,
        }
    }
}

impl EndpointPolicy {
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: u32, time_window: Duration) -> Self {
        self.rate_limit = rate_limit;
        self.time_window = time_window;
        self
    }

    #[must_use]
    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    #[must_use]
    pub fn with_throttle(mut self, min_interval: Duration, key: ThrottleKey) -> Self {
        self.throttle = Some(ThrottlePolicy { min_interval, key });
        self
    }
}

/// Known providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Spotify,
    Deezer,
    Genius,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spotify => "spotify",
            Self::Deezer => "deezer",
            Self::Genius => "genius",
        }
    }

    pub fn profile(self) -> ProviderProfile {
        match self {
            Self::Spotify => ProviderProfile::spotify(),
            Self::Deezer => ProviderProfile::deezer(),
            Self::Genius => ProviderProfile::genius(),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spotify" => Ok(Self::Spotify),
            "deezer" => Ok(Self::Deezer),
            "genius" => Ok(Self::Genius),
            other => Err(format!(
                "unknown provider: {other} (expected spotify, deezer or genius)"
            )),
        }
    }
}

/// Everything an [`ApiClient`](crate::client::ApiClient) needs to know
/// about one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub name: String,
    pub base_url: String,
    /// Rate-limit bucket shared by every request to this provider.
    pub domain: String,
    /// Retries per request after the first attempt.
    pub retries: u32,
    /// Whether requests carry a bearer token.
    pub requires_auth: bool,
    /// Proxy bases tried in order instead of calling the API directly.
    pub proxies: Vec<String>,
    pub policies: BTreeMap<EndpointClass, EndpointPolicy>,
}

impl ProviderProfile {
    /// A profile with default limits for every endpoint class.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            domain: domain.into(),
            retries: musix_core::controls::DEFAULT_RETRIES,
            requires_auth: false,
            proxies: Vec::new(),
            policies: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, class: EndpointClass, policy: EndpointPolicy) -> Self {
        self.policies.insert(class, policy);
        self
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn with_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    #[must_use]
    pub fn with_proxies<I, S>(mut self, proxies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.proxies = proxies.into_iter().map(Into::into).collect();
        self
    }

    /// Spotify Web API.
    pub fn spotify() -> Self {
        Self::new("spotify", "https://api.spotify.com/v1", "api.spotify.com")
            .with_auth()
            .with_policy(
                EndpointClass::Search,
                EndpointPolicy::default()
                    .with_rate_limit(10, Duration::from_secs(30))
                    .with_cache_time(Duration::from_secs(60))
                    .with_throttle(
                        Duration::from_millis(2000),
                        ThrottleKey::Shared("spotify-search".to_string()),
                    ),
            )
            .with_policy(
                EndpointClass::Browse,
                EndpointPolicy::default()
                    .with_rate_limit(20, Duration::from_secs(60))
                    .with_throttle(
                        Duration::from_millis(1000),
                        ThrottleKey::Shared("spotify-browse".to_string()),
                    ),
            )
            .with_policy(
                EndpointClass::Track,
                EndpointPolicy::default().with_throttle(
                    Duration::from_millis(500),
                    ThrottleKey::PerEndpoint("spotify-track-".to_string()),
                ),
            )
    }

    /// Deezer public API, reached through CORS proxies.
    pub fn deezer() -> Self {
        Self::new("deezer", "https://api.deezer.com", "api.deezer.com")
            .with_retries(0)
            .with_proxies([
                "https://corsproxy.io/?",
                "https://thingproxy.freeboard.io/fetch/",
            ])
            .with_policy(
                EndpointClass::Search,
                EndpointPolicy::default()
                    .with_rate_limit(10, Duration::from_secs(10))
                    .with_cache_time(Duration::from_secs(60))
                    .with_throttle(
                        Duration::from_millis(2000),
                        ThrottleKey::Shared("deezer-search".to_string()),
                    ),
            )
            .with_policy(
                EndpointClass::Chart,
                EndpointPolicy::default().with_throttle(
                    Duration::from_millis(5000),
                    ThrottleKey::Shared("deezer-chart".to_string()),
                ),
            )
    }

    /// Genius API.
    pub fn genius() -> Self {
        Self::new("genius", "https://api.genius.com", "api.genius.com").with_auth()
    }

    /// Policy for `class`, falling back to the default class and then to
    /// built-in limits.
    pub fn policy(&self, class: EndpointClass) -> EndpointPolicy {
        self.policies
            .get(&class)
            .or_else(|| self.policies.get(&EndpointClass::Default))
            .cloned()
            .unwrap_or_default()
    }

    /// Governor controls for a call to `endpoint`.
    pub fn controls_for(&self, endpoint: &str) -> RequestControls {
        let policy = self.policy(EndpointClass::classify(endpoint));
        RequestControls::default()
            .with_domain(self.domain.clone())
            .with_retries(self.retries)
            .with_rate_limit(policy.rate_limit, policy.time_window)
            .with_cache_time(policy.cache_time)
    }
}
