//! HTTP fetcher - reqwest with a browser identity, redirects and body caps.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchOutcome};
use crate::traits::fetcher::Fetcher;
use crate::types::config::DEFAULT_USER_AGENT;
use crate::types::fetch::{FetchOptions, FetchResult};

/// Maximum redirects followed per request.
const MAX_REDIRECTS: usize = 10;

/// Plain HTTP fetcher.
///
/// Does not execute JavaScript; the browser fallback covers those sites.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default browser user agent.
    pub fn new() -> FetchOutcome<Self> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    /// Create a fetcher presenting a custom user agent.
    pub fn with_user_agent(user_agent: &str) -> FetchOutcome<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            reqwest::header::UPGRADE_INSECURE_REQUESTS,
            reqwest::header::HeaderValue::from_static("1"),
        );

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                source: Box::new(e),
            })?;

        Ok(Self { client })
    }

    /// Use an existing client (shares its connection pool).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_inner(&self, url: &Url, opts: &FetchOptions) -> FetchOutcome<FetchResult> {
        let mut request = self.client.get(url.as_str());
        for (name, value) in &opts.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let mut response = request.send().await.map_err(|e| classify(url, opts, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > opts.max_body_bytes as u64 {
                return Err(FetchError::PayloadTooLarge {
                    url: url.to_string(),
                    limit: opts.max_body_bytes,
                });
            }
        }

        let final_url = response.url().clone();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        // Content-Length can lie or be absent; enforce the cap while reading.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(url, opts, e))? {
            if body.len() + chunk.len() > opts.max_body_bytes {
                return Err(FetchError::PayloadTooLarge {
                    url: url.to_string(),
                    limit: opts.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResult {
            status: status.as_u16(),
            headers,
            body,
            final_url,
        })
    }
}

fn classify(url: &Url, opts: &FetchOptions, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout: opts.timeout,
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            source: Box::new(e),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> FetchOutcome<FetchResult> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        debug!(url = %url, timeout_ms = opts.timeout.as_millis() as u64, "HTTP fetch starting");

        match tokio::time::timeout(opts.timeout, self.fetch_inner(url, opts)).await {
            Ok(Ok(result)) => {
                debug!(
                    url = %url,
                    final_url = %result.final_url,
                    bytes = result.body.len(),
                    "HTTP fetch complete"
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, error_class = %e.class(), "HTTP fetch failed");
                Err(e)
            }
            Err(_) => {
                warn!(url = %url, "HTTP fetch timed out");
                Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout: opts.timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn opts() -> FetchOptions {
        FetchOptions::new(Duration::from_secs(5), 1024 * 1024)
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/page").header_exists("user-agent");
                then.status(200)
                    .header("content-type", "text/html; charset=utf-8")
                    .body("<html><title>hi</title></html>");
            })
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&server.url("/page")).unwrap();
        let result = fetcher.fetch(&url, &opts()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.status, 200);
        assert_eq!(result.body, b"<html><title>hi</title></html>");
        assert_eq!(result.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(result.final_url, url);
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects() {
        let server = MockServer::start_async().await;
        let target = server.url("/final");
        server
            .mock_async(|when, then| {
                when.method(GET).path("/start");
                then.status(302).header("location", target.as_str());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/final");
                then.status(200).body("done");
            })
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&server.url("/start")).unwrap();
        let result = fetcher.fetch(&url, &opts()).await.unwrap();

        assert_eq!(result.final_url.path(), "/final");
        assert_eq!(result.body, b"done");
    }

    #[tokio::test]
    async fn test_non_success_status_is_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.jpg");
                then.status(404);
            })
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&server.url("/missing.jpg")).unwrap();
        let err = fetcher.fetch(&url, &opts()).await.unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/huge");
                then.status(200).body(vec![b'x'; 4096]);
            })
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&server.url("/huge")).unwrap();
        let small = FetchOptions::new(Duration::from_secs(5), 1024);
        let err = fetcher.fetch(&url, &small).await.unwrap_err();

        assert!(matches!(err, FetchError::PayloadTooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow");
                then.status(200).delay(Duration::from_secs(2)).body("late");
            })
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&server.url("/slow")).unwrap();
        let quick = FetchOptions::new(Duration::from_millis(200), 1024);
        let err = fetcher.fetch(&url, &quick).await.unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse("ftp://example.com/file").unwrap();
        let err = fetcher.fetch(&url, &opts()).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
