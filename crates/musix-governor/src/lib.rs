//! Client-side governance for third-party music APIs.
//!
//! The [`Governor`] composes four independent mechanisms around every
//! request:
//!
//! - [`RateLimiter`]: fixed-window admission per domain
//! - [`ResponseCache`]: TTL cache of successful GET payloads
//! - [`RequestQueue`]: concurrency cap with a FIFO backlog
//! - retry with jittered exponential backoff
//!
//! [`Throttle`] gates individual operations by minimum interval, and
//! [`Debouncer`] coalesces bursts of calls such as search-as-you-type.
//! [`ApiClient`] layers provider profiles, bearer tokens and proxy fallback
//! on top.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod backoff;
pub mod cache;
pub mod client;
pub mod config;
pub mod debounce;
pub mod governor;
pub mod provider;
pub mod queue;
pub mod rate_limiter;
pub mod throttle;
pub mod transport;

pub use cache::{MemoryCache, ResponseCache};
pub use client::{ApiClient, StaticToken, TokenProvider};
pub use config::Config;
pub use debounce::{create_debounced_search, Debouncer};
pub use governor::Governor;
pub use provider::{EndpointClass, EndpointPolicy, Provider, ProviderProfile};
pub use queue::RequestQueue;
pub use rate_limiter::RateLimiter;
pub use throttle::{Throttle, ThrottleGate};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
