//! The network seam under the governor.
//!
//! The governor never talks to `reqwest` directly: it hands an
//! [`HttpRequest`] to a [`Transport`] and interprets the [`HttpResponse`].
//! Production code uses [`ReqwestTransport`]; tests substitute scripted
//! transports to count and shape network calls.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use musix_core::{Error, Method, RequestOptions, Result};

/// Default user agent sent by [`ReqwestTransport`].
pub const DEFAULT_USER_AGENT: &str = "musix/0.1.0 (https://github.com/musix-app/musix)";

/// Default per-request timeout for [`ReqwestTransport`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One outgoing HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>, options: &RequestOptions) -> Self {
        Self {
            method: options.method(),
            url: url.into(),
            headers: options.headers.clone(),
            body: options.body.clone(),
        }
    }
}

/// A completed HTTP exchange: status plus raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A response whose body is the JSON encoding of `value`.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    /// A response without a body (e.g. 204 No Content).
    pub fn empty(status: u16) -> Self {
        Self::new(status, Vec::new())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns `true` when there is no payload to decode.
    pub fn is_empty(&self) -> bool {
        matches!(self.status, 204 | 205) || self.body.iter().all(u8::is_ascii_whitespace)
    }
}

/// Sends HTTP requests on behalf of the governor.
///
/// Implementations report transport-level failures as
/// [`Error::Network`]; non-success statuses are returned as responses and
/// judged by the caller.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Create a transport with the default user agent and a 30-second
    /// timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> std::result::Result<Self, reqwest::Error> {
        Self::with_settings(DEFAULT_USER_AGENT, DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom user agent and timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_settings(
        user_agent: &str,
        timeout: Duration,
    ) -> std::result::Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { http })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let network_error = |e: reqwest::Error| Error::Network {
            url: request.url.clone(),
            message: e.to_string(),
        };

        let mut builder = self
            .http
            .request(to_reqwest_method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(network_error)?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_request_from_options() {
        let options = RequestOptions::new()
            .with_method(Method::Post)
            .with_header("Content-Type", "application/json")
            .with_body(json!({"seed": "track"}));
        let request = HttpRequest::new("https://example.com/recommend", &options);

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://example.com/recommend");
        assert_eq!(request.headers["Content-Type"], "application/json");
        assert_eq!(request.body, Some(json!({"seed": "track"})));
    }

    #[test]
    fn test_response_success_and_empty() {
        assert!(HttpResponse::json(200, &json!({"ok": true})).is_success());
        assert!(!HttpResponse::empty(500).is_success());
        assert!(HttpResponse::empty(204).is_empty());
        assert!(HttpResponse::new(205, "ignored").is_empty());
        assert!(HttpResponse::new(200, "  \n").is_empty());
        assert!(!HttpResponse::json(200, &json!([])).is_empty());
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());
        assert!(ReqwestTransport::with_settings("musix-test", Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_reqwest_transport_is_debug() {
        let transport = ReqwestTransport::new().unwrap();
        let debug = format!("{:?}", transport);
        assert!(debug.contains("ReqwestTransport"));
    }
}
