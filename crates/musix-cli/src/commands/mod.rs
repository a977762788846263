pub mod config;
pub mod fetch;
pub mod get;

pub use fetch::run_fetch;
pub use get::{parse_param, run_get};
