use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};

use musix_core::controls::{
    DEFAULT_CACHE_TIME, DEFAULT_RATE_LIMIT, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY,
    DEFAULT_TIME_WINDOW,
};
use musix_core::RequestControls;

use crate::governor::Governor;
use crate::provider::Provider;
use crate::queue::DEFAULT_CONCURRENCY;
use crate::transport::{ReqwestTransport, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};

/// Configuration for musix.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (MUSIX_* prefix)
/// 3. Config file (~/.config/musix/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of requests in flight at once.
    pub concurrency: usize,

    /// Retries after the first attempt for transient failures.
    pub retries: u32,

    /// Base backoff delay in milliseconds; doubles per retry.
    pub retry_delay_ms: u64,

    /// Lifetime of cached GET responses in milliseconds.
    pub cache_time_ms: u64,

    /// Requests admitted per domain per window.
    pub rate_limit: u32,

    /// Rate-limit window in milliseconds.
    pub time_window_ms: u64,

    pub user_agent: String,

    pub request_timeout_secs: u64,

    /// Spotify access token.
    ///
    /// Can be set via:
    /// - CLI: musix get spotify /me --token ...
    /// - ENV: MUSIX_SPOTIFY_TOKEN
    /// - Config: spotify_token = "..."
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_token: Option<String>,

    /// Genius access token.
    ///
    /// Can be set via:
    /// - ENV: MUSIX_GENIUS_TOKEN
    /// - Config: genius_token = "..."
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genius_token: Option<String>,

    /// Minimum log level: error, warn, info, debug or trace. `RUST_LOG`
    /// refines it per module.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: millis(DEFAULT_RETRY_DELAY),
            cache_time_ms: millis(DEFAULT_CACHE_TIME),
            rate_limit: DEFAULT_RATE_LIMIT,
            time_window_ms: millis(DEFAULT_TIME_WINDOW),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            spotify_token: None,
            genius_token: None,
            log_level: "info".to_string(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/musix/config.toml
    /// Reads environment variables with MUSIX_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("musix");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;

        Ok(config)
    }

    /// Governor controls derived from the configured defaults.
    pub fn controls(&self) -> RequestControls {
        RequestControls::default()
            .with_retries(self.retries)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
            .with_cache_time(Duration::from_millis(self.cache_time_ms))
            .with_rate_limit(self.rate_limit, Duration::from_millis(self.time_window_ms))
    }

    /// Configured access token for `provider`, if any.
    pub fn token_for(&self, provider: Provider) -> Option<String> {
        match provider {
            Provider::Spotify => self.spotify_token.clone(),
            Provider::Genius => self.genius_token.clone(),
            Provider::Deezer => None,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn transport(&self) -> Result<ReqwestTransport> {
        ReqwestTransport::with_settings(
            &self.user_agent,
            Duration::from_secs(self.request_timeout_secs),
        )
        .context("Failed to create HTTP client")
    }

    /// A governor over a `reqwest` transport built from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn governor(&self) -> Result<Governor> {
        let transport = Arc::new(self.transport()?);
        Ok(Governor::with_concurrency(transport, self.concurrency))
    }
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/musix/config.toml
/// - macOS: ~/Library/Application Support/musix/config.toml
/// - Windows: %APPDATA%\musix\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("musix")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Musix Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (MUSIX_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Maximum number of requests in flight; further requests wait in order
concurrency = 5

# Retries after the first attempt for network errors and HTTP error
# statuses, 429 included. 401, 403 and 404 are never retried.
retries = 3

# Base backoff in milliseconds; doubled per retry with +/-20% jitter
retry_delay_ms = 1000

# How long successful GET responses are served from cache (milliseconds)
cache_time_ms = 300000

# At most `rate_limit` requests per domain in each `time_window_ms` window
rate_limit = 50
time_window_ms = 60000

# HTTP client settings
user_agent = "musix/0.1.0 (https://github.com/musix-app/musix)"
request_timeout_secs = 30

# Provider access tokens
#
# Can also be set via:
# - Environment: MUSIX_SPOTIFY_TOKEN=..., MUSIX_GENIUS_TOKEN=...
#spotify_token = "your-spotify-access-token"
#genius_token = "your-genius-access-token"

# Log level: error, warn, info, debug, trace
# RUST_LOG can refine it per module, e.g. RUST_LOG=musix_governor=debug
log_level = "info"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
