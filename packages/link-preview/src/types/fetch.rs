//! Fetch request options and raw responses.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

/// Raw response of a successful (2xx) fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// HTTP status code
    pub status: u16,

    /// Response headers, lowercased names
    pub headers: HashMap<String, String>,

    /// Body bytes, capped by `FetchOptions::max_body_bytes`
    pub body: Vec<u8>,

    /// URL after redirects
    pub final_url: Url,
}

impl FetchResult {
    pub fn new(final_url: Url, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: body.into(),
            final_url,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// Per-request fetch parameters.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Hard wall-clock timeout for the whole request, body included
    pub timeout: Duration,

    /// Maximum body size accepted
    pub max_body_bytes: usize,

    /// Extra request headers
    pub headers: Vec<(String, String)>,
}

impl FetchOptions {
    pub fn new(timeout: Duration, max_body_bytes: usize) -> Self {
        Self {
            timeout,
            max_body_bytes,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
