//! Error types for governed API requests.

use thiserror::Error;

/// Errors surfaced by the request governor and the clients built on it.
///
/// Retries happen inside the governor; once they are exhausted the last
/// error is returned unchanged so callers can inspect status codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A rate limiter or throttle rejected the call before any network work.
    #[error("rate limit exceeded for {key}; retry in {retry_after} seconds")]
    RateLimitExceeded { key: String, retry_after: u64 },

    /// The server answered with a non-success status.
    #[error("API error: {status} from {url}")]
    Http { status: u16, url: String },

    /// The request never produced a response (DNS, connect, timeout).
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    /// The caller cancelled the request.
    #[error("request to {url} was aborted")]
    Aborted { url: String },

    /// The response body could not be parsed as JSON.
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The request URL could not be parsed.
    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// The request needs a bearer token and none was available.
    #[error("authentication required for {url}")]
    Unauthenticated { url: String },
}

impl Error {
    /// Returns `true` when the governor should try the request again.
    ///
    /// Network failures and HTTP errors are transient, except for
    /// 401, 403 and 404 which will not change on a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => !matches!(status, 401 | 403 | 404),
            Self::Network { .. } => true,
            Self::RateLimitExceeded { .. }
            | Self::Aborted { .. }
            | Self::Decode { .. }
            | Self::InvalidUrl { .. }
            | Self::Unauthenticated { .. } => false,
        }
    }

    /// HTTP status associated with this error, if any.
    ///
    /// Rate-limit rejections report 429 and missing credentials report 401,
    /// mirroring what the remote service would have answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimitExceeded { .. } => Some(429),
            Self::Unauthenticated { .. } => Some(401),
            _ => None,
        }
    }

    /// Seconds the caller should wait before trying again, for rejections.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Returns `true` for rate-limit and throttle rejections.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }
}

/// Convenience alias for governed request results.
pub type Result<T> = std::result::Result<T, Error>;
