use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// HTTP method of a governed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request options passed through to the transport.
///
/// Everything except the abort signal takes part in the cache key, so two
/// requests that differ only in a header are cached separately.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestOptions {
    /// HTTP method; `None` means GET.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,

    /// Request headers, kept sorted so the cache key is deterministic.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// JSON request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Cancels the request when triggered.
    #[serde(skip)]
    pub signal: Option<CancellationToken>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// The effective method (GET when unset).
    pub fn method(&self) -> Method {
        self.method.unwrap_or(Method::Get)
    }

    /// Only GET requests are served from, and stored in, the response cache.
    pub fn is_cacheable(&self) -> bool {
        self.method() == Method::Get
    }

    /// Returns `true` if the caller has already cancelled this request.
    pub fn is_aborted(&self) -> bool {
        self.signal
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Derive the response-cache key for a request.
///
/// The key is the URL followed by the JSON form of the options, so
/// logically identical requests always map to the same entry.
pub fn cache_key(url: &str, options: &RequestOptions) -> String {
    let serialized = serde_json::to_string(options).unwrap_or_default();
    format!("{url}-{serialized}")
}
