//! Core request model for musix.
//!
//! This crate defines the error taxonomy shared by every layer of the
//! request governor, the request options and cache-key derivation, and the
//! per-request control knobs (retries, cache lifetime, rate-limit window).

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod controls;
pub mod error;
pub mod request;

pub use controls::RequestControls;
pub use error::{Error, Result};
pub use request::{cache_key, Method, RequestOptions};
