//! Per-render isolated browsing context.

use std::sync::Arc;

use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::Page;
use tracing::{debug, warn};

use super::pool::LiveBrowser;
use crate::error::RenderError;

/// Fresh browser context (own cookies and cache) holding a single page.
///
/// Call [`BrowsingContext::close`] when done. If the guard is dropped
/// instead (timeout, cancellation, panic) cleanup is spawned onto the
/// runtime so the context is still released.
pub struct BrowsingContext {
    browser: Arc<LiveBrowser>,
    context_id: Option<BrowserContextId>,
    page: Option<Page>,
    url: String,
}

impl BrowsingContext {
    /// Create the context and a blank page inside it.
    pub async fn open(browser: Arc<LiveBrowser>, url: &str) -> Result<Self, RenderError> {
        let created = browser
            .browser()
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| RenderError::Context(e.to_string()))?;

        let context_id = created.result.browser_context_id.clone();
        let mut guard = Self {
            browser,
            context_id: Some(context_id.clone()),
            page: None,
            url: url.to_string(),
        };

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id)
            .build()
            .map_err(RenderError::Context)?;

        // On failure the guard drops here and disposes the context.
        let page = guard
            .browser
            .browser()
            .new_page(params)
            .await
            .map_err(|e| RenderError::Context(e.to_string()))?;
        guard.page = Some(page);

        Ok(guard)
    }

    pub fn page(&self) -> Result<&Page, RenderError> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::Context("page already closed".to_string()))
    }

    /// Close the page and dispose the context.
    pub async fn close(mut self) {
        let page = self.page.take();
        let context_id = self.context_id.take();
        release(self.browser.clone(), page, context_id, std::mem::take(&mut self.url)).await;
    }
}

impl Drop for BrowsingContext {
    fn drop(&mut self) {
        if self.page.is_none() && self.context_id.is_none() {
            return;
        }

        let browser = self.browser.clone();
        let page = self.page.take();
        let context_id = self.context_id.take();
        let url = std::mem::take(&mut self.url);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release(browser, page, context_id, url));
            }
            Err(_) => warn!(url = %url, "No runtime to release browsing context"),
        }
    }
}

async fn release(
    browser: Arc<LiveBrowser>,
    page: Option<Page>,
    context_id: Option<BrowserContextId>,
    url: String,
) {
    if !browser.is_alive() {
        return;
    }

    if let Some(page) = page {
        if let Err(e) = page.close().await {
            warn!(url = %url, error = %e, "Failed to close page");
        }
    }

    if let Some(id) = context_id {
        match browser
            .browser()
            .execute(DisposeBrowserContextParams::new(id))
            .await
        {
            Ok(_) => debug!(url = %url, "Browsing context released"),
            Err(e) => warn!(url = %url, error = %e, "Failed to dispose browsing context"),
        }
    }
}
