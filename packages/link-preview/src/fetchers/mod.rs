//! Fetcher implementations.
//!
//! - `HttpFetcher` - reqwest-based GET used by the lightweight path

pub mod http;

pub use http::HttpFetcher;
