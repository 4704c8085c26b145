//! Chromium renderer over the DevTools protocol.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::io::{self, StreamHandle};
use chromiumoxide::cdp::browser_protocol::network::{
    LoadNetworkResourceOptions, LoadNetworkResourcePageResult, LoadNetworkResourceParams, LoaderId,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, FrameId, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tracing::{debug, instrument, warn};
use url::Url;

use super::context::BrowsingContext;
use super::pool::BrowserPool;
use crate::error::RenderError;
use crate::extract::{InPageCandidates, IN_PAGE_EXTRACT_JS};
use crate::thumbnail;
use crate::traits::renderer::{ImageSource, RenderedPage, Renderer};
use crate::types::config::RenderConfig;

/// Bytes requested per `IO.read` call.
const READ_CHUNK_BYTES: i64 = 256 * 1024;

/// Headless Chromium fallback.
///
/// Loads the page in a fresh context at a 1200×630 viewport, waits for the
/// network to go idle plus a settle delay, then reads metadata from the live
/// DOM. The `og:image` is loaded through the page's main frame so it shares
/// the context's cookies; if that fails, or the payload is not a decodable
/// raster image, a viewport screenshot is used instead.
pub struct ChromiumRenderer {
    pool: BrowserPool,
}

impl ChromiumRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            pool: BrowserPool::new(config),
        }
    }

    pub fn pool(&self) -> &BrowserPool {
        &self.pool
    }

    fn config(&self) -> &RenderConfig {
        self.pool.config()
    }

    /// Close the shared browser.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    async fn render_in(&self, page: &Page, url: &Url) -> Result<RenderedPage, RenderError> {
        let config = self.config();

        page.execute(SetDeviceMetricsOverrideParams::new(
            config.viewport_width as i64,
            config.viewport_height as i64,
            1.0,
            false,
        ))
        .await
        .map_err(automation)?;
        page.execute(SetUserAgentOverrideParams::new(config.user_agent.clone()))
            .await
            .map_err(automation)?;

        let main_frame = page.mainframe().await.map_err(automation)?;
        match tokio::time::timeout(config.navigation_timeout, navigate(page, url, main_frame))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(RenderError::Timeout {
                    url: url.to_string(),
                    timeout: config.navigation_timeout,
                })
            }
        }

        tokio::time::sleep(config.settle_delay).await;

        let candidates = candidates_or_default(evaluate(page, IN_PAGE_EXTRACT_JS).await, url);
        let (metadata, final_url) = candidates.into_metadata(url, config.max_title_chars);

        let fetched = match &metadata.image_url {
            Some(image_url) => match self.fetch_in_page(page, image_url).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    debug!(url = %url, image_url = %image_url, error = %e, "Rendered image fetch failed, taking screenshot");
                    None
                }
            },
            None => None,
        };

        let (image, image_source) = match fetched {
            Some(bytes) => (bytes, ImageSource::OgImage),
            None => (self.screenshot(page).await?, ImageSource::Screenshot),
        };

        Ok(RenderedPage {
            metadata,
            final_url,
            image,
            image_source,
        })
    }

    async fn fetch_in_page(&self, page: &Page, image_url: &Url) -> Result<Vec<u8>, RenderError> {
        let config = self.config();

        let bytes = tokio::time::timeout(
            config.image_timeout,
            load_resource(page, image_url, config.max_image_bytes),
        )
        .await
        .map_err(|_| RenderError::Timeout {
            url: image_url.to_string(),
            timeout: config.image_timeout,
        })??;

        check_image_payload(&bytes, config.max_image_bytes)?;
        Ok(bytes)
    }

    async fn screenshot(&self, page: &Page) -> Result<Vec<u8>, RenderError> {
        page.screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Jpeg)
                .quality(self.config().screenshot_quality)
                .build(),
        )
        .await
        .map_err(automation)
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    #[instrument(skip(self, url, timeout), fields(url = %url, timeout_ms = timeout.as_millis() as u64))]
    async fn render(&self, url: &Url, timeout: Duration) -> Result<RenderedPage, RenderError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                reason: "unsupported scheme".to_string(),
            });
        }

        let browser = self.pool.acquire().await?;
        let context = BrowsingContext::open(browser.clone(), url.as_str()).await?;

        let result = match context.page() {
            Ok(page) => tokio::time::timeout(timeout, self.render_in(page, url)).await,
            Err(e) => Ok(Err(e)),
        };
        context.close().await;

        match result {
            Ok(Ok(rendered)) => {
                debug!(
                    final_url = %rendered.final_url,
                    source = ?rendered.image_source,
                    bytes = rendered.image.len(),
                    "Render complete"
                );
                Ok(rendered)
            }
            Ok(Err(e)) => {
                if !browser.is_alive() {
                    warn!(error = %e, "Browser died during render");
                }
                Err(e)
            }
            Err(_) => Err(RenderError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }
}

/// Navigate and wait for the `networkIdle` lifecycle event of the new
/// main-frame document.
async fn navigate(page: &Page, url: &Url, main_frame: Option<FrameId>) -> Result<(), RenderError> {
    let navigation = |reason: String| RenderError::Navigation {
        url: url.to_string(),
        reason,
    };

    page.execute(SetLifecycleEventsEnabledParams::new(true))
        .await
        .map_err(automation)?;
    let mut events = page
        .event_listener::<EventLifecycleEvent>()
        .await
        .map_err(automation)?;

    page.goto(url.as_str())
        .await
        .map_err(|e| navigation(e.to_string()))?;

    let mut wait = LifecycleWait::new(main_frame);
    while let Some(event) = events.next().await {
        if wait.observe(&event) {
            return Ok(());
        }
    }

    Err(navigation("page closed before the network went idle".to_string()))
}

/// Tracks lifecycle events until the main frame's new document is idle.
///
/// Events from other frames are ignored, and `networkIdle` only counts for
/// the loader that emitted the latest main-frame `init`.
#[derive(Debug, Default)]
struct LifecycleWait {
    main_frame: Option<FrameId>,
    loader: Option<LoaderId>,
}

impl LifecycleWait {
    fn new(main_frame: Option<FrameId>) -> Self {
        Self {
            main_frame,
            loader: None,
        }
    }

    fn observe(&mut self, event: &EventLifecycleEvent) -> bool {
        // Frame id unknown: adopt the first document to initialize.
        if self.main_frame.is_none() && event.name == "init" {
            self.main_frame = Some(event.frame_id.clone());
        }
        if self.main_frame.as_ref() != Some(&event.frame_id) {
            return false;
        }

        match event.name.as_str() {
            "init" => {
                self.loader = Some(event.loader_id.clone());
                false
            }
            "networkIdle" => self.loader.as_ref() == Some(&event.loader_id),
            _ => false,
        }
    }
}

/// Candidates from the live DOM, or empty ones when the script failed.
///
/// An empty candidate set still yields a screenshot; metadata then comes out
/// blank with the requested URL as base.
fn candidates_or_default(
    result: Result<InPageCandidates, RenderError>,
    url: &Url,
) -> InPageCandidates {
    result.unwrap_or_else(|e| {
        debug!(url = %url, error = %e, "In-page extraction failed, continuing with screenshot");
        InPageCandidates::default()
    })
}

/// Load `url` through the page's main frame with its credentials, streaming
/// the body back over `IO.read`.
async fn load_resource(page: &Page, url: &Url, max_bytes: usize) -> Result<Vec<u8>, RenderError> {
    let mut params = LoadNetworkResourceParams::new(
        url.as_str(),
        LoadNetworkResourceOptions::new(false, true),
    );
    params.frame_id = page.mainframe().await.map_err(automation)?;

    let resource = page.execute(params).await.map_err(automation)?.result.resource;
    let handle = resource_stream(resource)?;

    let result = read_stream(page, &handle, max_bytes).await;
    if let Err(e) = page.execute(io::CloseParams::new(handle)).await {
        debug!(error = %e, "Failed to close resource stream");
    }
    result
}

/// The body stream of a successful 2xx load.
fn resource_stream(resource: LoadNetworkResourcePageResult) -> Result<StreamHandle, RenderError> {
    let status = resource.http_status_code.map(|code| code as u16);
    if !resource.success || !status.is_some_and(|code| (200..300).contains(&code)) {
        return Err(RenderError::Automation(format!(
            "image load failed: status {} {}",
            status.map_or_else(|| "none".to_string(), |code| code.to_string()),
            resource.net_error_name.unwrap_or_default()
        )));
    }
    resource
        .stream
        .ok_or_else(|| RenderError::Automation("image load returned no body".to_string()))
}

async fn read_stream(
    page: &Page,
    handle: &StreamHandle,
    max_bytes: usize,
) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    loop {
        let mut read = io::ReadParams::new(handle.clone());
        read.size = Some(READ_CHUNK_BYTES);
        let chunk = page.execute(read).await.map_err(automation)?.result;

        if chunk.base64_encoded.unwrap_or(false) {
            bytes.extend(BASE64.decode(chunk.data.as_bytes()).map_err(automation)?);
        } else {
            bytes.extend_from_slice(chunk.data.as_bytes());
        }
        if bytes.len() > max_bytes {
            return Err(RenderError::Automation(format!(
                "image exceeds {max_bytes} bytes"
            )));
        }
        if chunk.eof {
            return Ok(bytes);
        }
    }
}

/// Accept only non-empty payloads within `max_bytes` whose header decodes as
/// a supported raster format.
fn check_image_payload(bytes: &[u8], max_bytes: usize) -> Result<(), RenderError> {
    if bytes.len() > max_bytes {
        return Err(RenderError::Automation(format!(
            "image exceeds {max_bytes} bytes"
        )));
    }
    thumbnail::peek_dimensions(bytes)
        .map(|_| ())
        .map_err(|e| RenderError::Automation(format!("unusable image payload: {e}")))
}

async fn evaluate<T: serde::de::DeserializeOwned>(
    page: &Page,
    expression: &str,
) -> Result<T, RenderError> {
    let params = EvaluateParams::builder()
        .expression(expression)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(RenderError::Automation)?;

    page.evaluate_expression(params)
        .await
        .map_err(automation)?
        .into_value()
        .map_err(automation)
}

fn automation(e: impl std::fmt::Display) -> RenderError {
    RenderError::Automation(e.to_string())
}
