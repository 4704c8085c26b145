//! Renderer trait for the headless-browser fallback.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::RenderError;
use crate::types::metadata::ExtractedMetadata;

/// Where the rendered image bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// `og:image` fetched through the browser's own network context
    OgImage,
    /// Viewport screenshot
    Screenshot,
}

/// Result of a full browser render.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Metadata read from the live DOM
    pub metadata: ExtractedMetadata,

    /// Location after navigation and client-side redirects
    pub final_url: Url,

    /// Raw image bytes, not yet normalized
    pub image: Vec<u8>,

    pub image_source: ImageSource,
}

/// Loads a page in an isolated browsing context and re-derives metadata and
/// an image from the executed page.
///
/// The context is released on every exit path. A failed image fetch is not
/// an error: the renderer falls back to a screenshot.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url, timeout: Duration) -> Result<RenderedPage, RenderError>;
}
