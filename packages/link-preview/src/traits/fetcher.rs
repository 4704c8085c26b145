//! Fetcher trait for plain HTTP retrieval.

use async_trait::async_trait;
use url::Url;

use crate::error::FetchOutcome;
use crate::types::fetch::{FetchOptions, FetchResult};

/// Performs a single GET with a browser-like identity.
///
/// Implementations follow redirects, enforce `opts.timeout` as a hard
/// wall-clock limit, cap the body at `opts.max_body_bytes`, and never retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> FetchOutcome<FetchResult>;
}
