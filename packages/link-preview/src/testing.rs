//! Testing utilities including mock implementations.
//!
//! Useful for exercising the pipeline without network access or a browser.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use url::Url;

use crate::error::{FetchError, FetchOutcome, RenderError};
use crate::traits::fetcher::Fetcher;
use crate::traits::renderer::{ImageSource, RenderedPage, Renderer};
use crate::types::fetch::{FetchOptions, FetchResult};
use crate::types::metadata::ExtractedMetadata;

/// Solid-colour JPEG of the given size, for image fixtures.
pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 60, 30]));
    let mut buf = Vec::new();
    match DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg) {
        Ok(()) => buf,
        Err(_) => Vec::new(),
    }
}

#[derive(Debug, Clone)]
enum MockResponse {
    Body {
        final_url: Option<String>,
        content_type: String,
        body: Vec<u8>,
    },
    Status(u16),
    Timeout,
    Refused,
}

/// A mock fetcher for testing.
///
/// Returns predefined responses by URL; unknown URLs fail as connection
/// refused.
#[derive(Default)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, MockResponse>>>,

    /// Artificial latency applied before every response
    latency: Option<Duration>,

    /// Call tracking
    calls: Arc<RwLock<Vec<MockFetcherCall>>>,
}

/// Record of a call made to the mock fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct MockFetcherCall {
    pub url: String,
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    fn respond(self, url: impl Into<String>, response: MockResponse) -> Self {
        self.responses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), response);
        self
    }

    /// Serve HTML at `url`.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.respond(
            url,
            MockResponse::Body {
                final_url: None,
                content_type: "text/html; charset=utf-8".to_string(),
                body: html.into().into_bytes(),
            },
        )
    }

    /// Serve HTML at `url` as if redirected to `final_url`.
    pub fn with_redirected_page(
        self,
        url: impl Into<String>,
        final_url: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        self.respond(
            url,
            MockResponse::Body {
                final_url: Some(final_url.into()),
                content_type: "text/html; charset=utf-8".to_string(),
                body: html.into().into_bytes(),
            },
        )
    }

    /// Serve raw bytes at `url`.
    pub fn with_bytes(
        self,
        url: impl Into<String>,
        content_type: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        self.respond(
            url,
            MockResponse::Body {
                final_url: None,
                content_type: content_type.into(),
                body,
            },
        )
    }

    /// Answer `url` with a non-2xx status.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.respond(url, MockResponse::Status(status))
    }

    /// Make `url` time out.
    pub fn timeout_url(self, url: impl Into<String>) -> Self {
        self.respond(url, MockResponse::Timeout)
    }

    /// Make `url` fail at the transport level.
    pub fn fail_url(self, url: impl Into<String>) -> Self {
        self.respond(url, MockResponse::Refused)
    }

    /// Delay every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockFetcherCall> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of fetches of `url`.
    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.url == url).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> FetchOutcome<FetchResult> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockFetcherCall {
                url: url.to_string(),
                timeout: opts.timeout,
                max_body_bytes: opts.max_body_bytes,
            });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = self
            .responses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url.as_str())
            .cloned()
            .unwrap_or(MockResponse::Refused);

        match response {
            MockResponse::Body {
                final_url,
                content_type,
                body,
            } => {
                if body.len() > opts.max_body_bytes {
                    return Err(FetchError::PayloadTooLarge {
                        url: url.to_string(),
                        limit: opts.max_body_bytes,
                    });
                }
                let final_url = match final_url {
                    Some(u) => Url::parse(&u).map_err(|_| FetchError::InvalidUrl { url: u })?,
                    None => url.clone(),
                };
                Ok(FetchResult::new(final_url, body).with_header("content-type", content_type))
            }
            MockResponse::Status(status) => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            MockResponse::Timeout => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: opts.timeout,
            }),
            MockResponse::Refused => Err(FetchError::Transport {
                url: url.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "Mock connection refused",
                )),
            }),
        }
    }
}

#[derive(Debug, Clone)]
enum MockRender {
    Page(RenderedPage),
    Timeout,
    Navigation(String),
}

/// A mock renderer for testing.
///
/// Returns predefined renders by URL; unknown URLs fail navigation. An
/// unavailable mock rejects every call like a browser that never launched.
#[derive(Default)]
pub struct MockRenderer {
    renders: Arc<RwLock<HashMap<String, MockRender>>>,

    unavailable: bool,

    /// Call tracking
    calls: Arc<RwLock<Vec<MockRendererCall>>>,
}

/// Record of a call made to the mock renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct MockRendererCall {
    pub url: String,
    pub timeout: Duration,
}

impl MockRenderer {
    /// Create a new mock renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer whose browser could not be launched.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    fn respond(self, url: impl Into<String>, render: MockRender) -> Self {
        self.renders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), render);
        self
    }

    /// Predefined render result for `url`.
    pub fn with_render(self, url: impl Into<String>, page: RenderedPage) -> Self {
        self.respond(url, MockRender::Page(page))
    }

    /// Render `url` as a page with the given title and a screenshot of the
    /// given size.
    pub fn with_screenshot(
        self,
        url: &str,
        title: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Self {
        let final_url = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return self.respond(url, MockRender::Navigation("bad URL".into())),
        };
        let page = RenderedPage {
            metadata: ExtractedMetadata {
                title: title.into(),
                ..Default::default()
            },
            final_url,
            image: jpeg_fixture(width, height),
            image_source: ImageSource::Screenshot,
        };
        self.with_render(url, page)
    }

    /// Make rendering `url` time out.
    pub fn timeout_url(self, url: impl Into<String>) -> Self {
        self.respond(url, MockRender::Timeout)
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockRendererCall> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<RenderedPage, RenderError> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockRendererCall {
                url: url.to_string(),
                timeout,
            });

        if self.unavailable {
            return Err(RenderError::Unavailable("mock browser not installed".into()));
        }

        let render = self
            .renders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| MockRender::Navigation("net::ERR_NAME_NOT_RESOLVED".into()));

        match render {
            MockRender::Page(page) => Ok(page),
            MockRender::Timeout => Err(RenderError::Timeout {
                url: url.to_string(),
                timeout,
            }),
            MockRender::Navigation(reason) => Err(RenderError::Navigation {
                url: url.to_string(),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> FetchOptions {
        FetchOptions::new(Duration::from_secs(15), 1024 * 1024)
    }

    #[tokio::test]
    async fn test_mock_fetcher_serves_and_tracks() {
        let fetcher = MockFetcher::new()
            .with_page("https://example.com/", "<title>Hi</title>")
            .with_status("https://example.com/missing.jpg", 404);

        let url = Url::parse("https://example.com/").unwrap();
        let page = fetcher.fetch(&url, &opts()).await.unwrap();
        assert_eq!(page.body, b"<title>Hi</title>");
        assert_eq!(page.content_type(), Some("text/html; charset=utf-8"));

        let missing = Url::parse("https://example.com/missing.jpg").unwrap();
        let err = fetcher.fetch(&missing, &opts()).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));

        let unknown = Url::parse("https://nowhere.test/").unwrap();
        assert!(fetcher.fetch(&unknown, &opts()).await.unwrap_err().is_transport());

        assert_eq!(fetcher.calls().len(), 3);
        assert_eq!(fetcher.call_count("https://example.com/"), 1);
    }

    #[tokio::test]
    async fn test_mock_fetcher_enforces_body_cap() {
        let fetcher = MockFetcher::new().with_bytes("https://example.com/big.jpg", "image/jpeg", vec![0; 64]);
        let url = Url::parse("https://example.com/big.jpg").unwrap();
        let err = fetcher
            .fetch(&url, &FetchOptions::new(Duration::from_secs(1), 16))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::PayloadTooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn test_mock_renderer() {
        let renderer = MockRenderer::new().with_screenshot("https://spa.example.com/", "Rendered", 1200, 630);
        let url = Url::parse("https://spa.example.com/").unwrap();

        let page = renderer.render(&url, Duration::from_secs(30)).await.unwrap();
        assert_eq!(page.metadata.title, "Rendered");
        assert_eq!(page.image_source, ImageSource::Screenshot);
        assert!(!page.image.is_empty());

        let unavailable = MockRenderer::unavailable();
        assert!(matches!(
            unavailable.render(&url, Duration::from_secs(30)).await,
            Err(RenderError::Unavailable(_))
        ));
        assert_eq!(renderer.call_count(), 1);
        assert_eq!(unavailable.call_count(), 1);
    }
}
