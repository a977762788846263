//! End-to-end tests for the governed request path.
//!
//! The first half drives a [`Governor`] over an in-process transport with
//! paused time; the second half runs the real `reqwest` transport against a
//! local wiremock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use musix_core::{Error, Method, RequestControls, RequestOptions, Result};
use musix_governor::{
    create_debounced_search, Governor, HttpRequest, HttpResponse, ReqwestTransport, Transport,
};
use serde_json::{json, Value};
use tokio::task::JoinSet;

/// Answers every request after `delay`, tracking concurrency and order.
#[derive(Debug)]
struct SlowTransport {
    delay: Duration,
    failures_before_success: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl SlowTransport {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            failures_before_success: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    fn failing_first(delay: Duration, failures: usize) -> Self {
        let transport = Self::new(delay);
        transport
            .failures_before_success
            .store(failures, Ordering::SeqCst);
        transport
    }

    fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for SlowTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.urls.lock().unwrap().push(request.url.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failing = self
            .failures_before_success
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Ok(HttpResponse::empty(503));
        }
        Ok(HttpResponse::json(200, &json!({ "url": request.url })))
    }
}

fn governor_over(transport: &Arc<SlowTransport>, concurrency: usize) -> Arc<Governor> {
    Arc::new(Governor::with_concurrency(
        Arc::clone(transport) as Arc<dyn Transport>,
        concurrency,
    ))
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_capped_across_callers() {
    let transport = Arc::new(SlowTransport::new(Duration::from_millis(100)));
    let governor = governor_over(&transport, 3);
    let controls = RequestControls::default().with_rate_limit(100, Duration::from_secs(60));

    let mut tasks = JoinSet::new();
    for i in 0..10 {
        let governor = Arc::clone(&governor);
        let controls = controls.clone();
        tasks.spawn(async move {
            let url = format!("https://api.example.com/items/{i}");
            let value = governor
                .request(&url, &RequestOptions::new(), &controls)
                .await;
            (url, value)
        });
    }

    let mut completed = 0;
    while let Some(joined) = tasks.join_next().await {
        let (url, value) = joined.unwrap();
        assert_eq!(value.unwrap(), json!({ "url": url }));
        completed += 1;
    }

    assert_eq!(completed, 10);
    assert_eq!(transport.peak.load(Ordering::SeqCst), 3);
    assert_eq!(governor.queue().running(), 0);
    assert_eq!(governor.queue().waiting(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_requests_start_in_arrival_order() {
    let transport = Arc::new(SlowTransport::new(Duration::from_millis(50)));
    let governor = governor_over(&transport, 1);

    let mut tasks = JoinSet::new();
    for name in ["a", "b", "c", "d"] {
        let governor = Arc::clone(&governor);
        tasks.spawn(async move {
            let url = format!("https://api.example.com/{name}");
            governor
                .request(&url, &RequestOptions::new(), &RequestControls::default())
                .await
        });
        tokio::task::yield_now().await;
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    let urls = transport.urls.lock().unwrap().clone();
    assert_eq!(
        urls,
        vec![
            "https://api.example.com/a",
            "https://api.example.com/b",
            "https://api.example.com/c",
            "https://api.example.com/d",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cache_and_rate_limit_share_one_window() {
    let transport = Arc::new(SlowTransport::new(Duration::from_millis(10)));
    let governor = governor_over(&transport, 5);
    let controls = RequestControls::default()
        .with_domain("api.deezer.com")
        .with_rate_limit(2, Duration::from_secs(10));
    let url = "https://api.deezer.com/chart";

    let first = governor
        .request(url, &RequestOptions::new(), &controls)
        .await
        .unwrap();
    let cached = governor
        .request(url, &RequestOptions::new(), &controls)
        .await
        .unwrap();
    assert_eq!(first, cached);
    assert_eq!(transport.calls(), 1);

    // Cache hits still count against the window.
    let err = governor
        .request(url, &RequestOptions::new(), &controls)
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.status(), Some(429));

    tokio::time::advance(Duration::from_millis(10_001)).await;
    assert!(governor
        .request(url, &RequestOptions::new(), &controls)
        .await
        .is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_recover_within_retry_budget() {
    let transport = Arc::new(SlowTransport::failing_first(Duration::from_millis(5), 2));
    let governor = governor_over(&transport, 5);
    let controls = RequestControls::default()
        .with_retries(2)
        .with_retry_delay(Duration::from_millis(100));

    let value = governor
        .request(
            "https://api.spotify.com/v1/browse/new-releases",
            &RequestOptions::new(),
            &controls,
        )
        .await
        .unwrap();
    assert!(value.get("url").is_some());
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_exhaustion_surfaces_last_error() {
    let transport = Arc::new(SlowTransport::failing_first(Duration::from_millis(5), 10));
    let governor = governor_over(&transport, 5);
    let controls = RequestControls::default()
        .with_retries(1)
        .with_retry_delay(Duration::from_millis(100));

    let err = governor
        .request(
            "https://api.genius.com/songs/1",
            &RequestOptions::new(),
            &controls,
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::Http {
            status: 503,
            url: "https://api.genius.com/songs/1".to_string(),
        }
    );
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_search_only_sends_final_query() {
    let transport = Arc::new(SlowTransport::new(Duration::from_millis(5)));
    let governor = governor_over(&transport, 5);
    let results: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let search = {
        let governor = Arc::clone(&governor);
        let results = Arc::clone(&results);
        create_debounced_search(
            move |query: String| {
                let governor = Arc::clone(&governor);
                let results = Arc::clone(&results);
                async move {
                    let url = format!("https://api.deezer.com/search?q={query}");
                    if let Ok(value) = governor
                        .request(&url, &RequestOptions::new(), &RequestControls::default())
                        .await
                    {
                        results.lock().unwrap().push(value);
                    }
                }
            },
            None,
        )
    };

    for query in ["d", "da", "daf", "daft"] {
        search.call(query.to_string());
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(
        *transport.urls.lock().unwrap(),
        vec!["https://api.deezer.com/search?q=daft".to_string()]
    );
    assert_eq!(results.lock().unwrap().len(), 1);
}

mod http {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn governor() -> Governor {
        let transport = ReqwestTransport::with_settings("musix-test", Duration::from_secs(5))
            .expect("client builds");
        Governor::new(Arc::new(transport))
    }

    fn quick_controls() -> RequestControls {
        RequestControls::default().with_retry_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_identical_gets_hit_the_server_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "tracks": { "items": [] } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let governor = governor();
        let url = format!("{}/v1/search", server.uri());
        let first = governor
            .request(&url, &RequestOptions::new(), &quick_controls())
            .await
            .unwrap();
        let second = governor
            .request(&url, &RequestOptions::new(), &quick_controls())
            .await
            .unwrap();

        assert_eq!(first, json!({ "tracks": { "items": [] } }));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chart"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let governor = governor();
        let url = format!("{}/chart", server.uri());
        let err = governor
            .request(
                &url,
                &RequestOptions::new(),
                &quick_controls().with_retries(2),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artist/0"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let governor = governor();
        let url = format!("{}/artist/0", server.uri());
        let err = governor
            .request(&url, &RequestOptions::new(), &quick_controls())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_post_sends_headers_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/me/playlists"))
            .and(header("Authorization", "Bearer token-123"))
            .and(body_json(json!({ "name": "Road trip" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "pl1" })))
            .expect(2)
            .mount(&server)
            .await;

        let governor = governor();
        let url = format!("{}/v1/me/playlists", server.uri());
        let options = RequestOptions::new()
            .with_method(Method::Post)
            .with_header("Authorization", "Bearer token-123")
            .with_body(json!({ "name": "Road trip" }));

        for _ in 0..2 {
            let value = governor
                .request(&url, &options, &quick_controls())
                .await
                .unwrap();
            assert_eq!(value, json!({ "id": "pl1" }));
        }
    }

    #[tokio::test]
    async fn test_no_content_yields_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/me/tracks"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let governor = governor();
        let url = format!("{}/v1/me/tracks", server.uri());
        let options = RequestOptions::new().with_method(Method::Delete);
        let value = governor
            .request(&url, &options, &quick_controls())
            .await
            .unwrap();

        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_cached_fetch_single_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/track/3135556"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let governor = governor();
        let url = format!("{}/track/3135556", server.uri());
        let err = governor
            .cached_fetch(&url, &RequestOptions::new(), Duration::from_secs(60))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_network_error() {
        let governor = governor();
        let err = governor
            .request(
                "http://127.0.0.1:9/unreachable",
                &RequestOptions::new(),
                &quick_controls().with_retries(0),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Network { .. }));
    }
}
