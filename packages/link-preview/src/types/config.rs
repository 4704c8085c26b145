//! Configuration types for fetching, normalization, rendering and workers.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use super::fetch::FetchOptions;
use super::metadata::TITLE_MAX_CHARS;

/// Browser-like identity used for plain HTTP fetches and the headless browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for the enrichment orchestrator.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Timeout for the page fetch. Default: 15s.
    pub page_timeout: Duration,

    /// Timeout for the `og:image` fetch. Default: 10s.
    pub image_timeout: Duration,

    /// Page body cap. Default: 5 MiB.
    pub max_page_bytes: usize,

    /// Image body cap. Default: 10 MiB.
    pub max_image_bytes: usize,

    /// Maximum stored title length in characters. Default: 249.
    pub max_title_chars: usize,

    /// Budget handed to the rendering fallback. Default: the
    /// [`RenderConfig`] total budget.
    pub render_timeout: Duration,

    /// Thumbnail normalization settings.
    pub normalize: NormalizeConfig,

    /// Filename prefix for images found by plain HTTP. Default: `preview`.
    pub lightweight_prefix: String,

    /// Filename prefix for images produced by the browser. Default: `pageimg`.
    pub fallback_prefix: String,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(15),
            image_timeout: Duration::from_secs(10),
            max_page_bytes: 5 * 1024 * 1024,
            max_image_bytes: 10 * 1024 * 1024,
            max_title_chars: TITLE_MAX_CHARS,
            render_timeout: RenderConfig::default().total_budget(),
            normalize: NormalizeConfig::default(),
            lightweight_prefix: "preview".to_string(),
            fallback_prefix: "pageimg".to_string(),
        }
    }
}

impl EnrichConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_image_timeout(mut self, timeout: Duration) -> Self {
        self.image_timeout = timeout;
        self
    }

    pub fn with_max_page_bytes(mut self, bytes: usize) -> Self {
        self.max_page_bytes = bytes;
        self
    }

    pub fn with_max_image_bytes(mut self, bytes: usize) -> Self {
        self.max_image_bytes = bytes;
        self
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn with_normalize(mut self, normalize: NormalizeConfig) -> Self {
        self.normalize = normalize;
        self
    }

    /// Fetch options for the page request.
    pub fn page_fetch(&self) -> FetchOptions {
        FetchOptions::new(self.page_timeout, self.max_page_bytes).with_header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
    }

    /// Fetch options for the image request.
    pub fn image_fetch(&self) -> FetchOptions {
        FetchOptions::new(self.image_timeout, self.max_image_bytes)
            .with_header("Accept", "image/avif,image/webp,image/*,*/*;q=0.8")
    }

    /// Stored filename for an image from the lightweight path.
    pub fn lightweight_filename(&self, id: impl std::fmt::Display) -> String {
        format!("{}_{}.jpg", self.lightweight_prefix, id)
    }

    /// Stored filename for an image from the fallback path.
    pub fn fallback_filename(&self, id: impl std::fmt::Display) -> String {
        format!("{}_{}.jpg", self.fallback_prefix, id)
    }
}

/// Thumbnail normalization settings.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeConfig {
    /// Bounding box width. Default: 600.
    pub max_width: u32,

    /// Bounding box height. Default: 315.
    pub max_height: u32,

    /// JPEG quality 1-100. Default: 85.
    pub quality: u8,

    /// Background transparency is flattened onto. Default: white.
    pub background: [u8; 3],

    /// Decoder allocation cap, guards against decompression bombs.
    /// Default: 256 MiB.
    pub max_decode_alloc: u64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_width: 600,
            max_height: 315,
            quality: 85,
            background: [255, 255, 255],
            max_decode_alloc: 256 * 1024 * 1024,
        }
    }
}

impl NormalizeConfig {
    pub fn with_bounds(mut self, max_width: u32, max_height: u32) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }
}

/// Headless-browser fallback settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Overall budget for navigation + network idle. Default: 30s.
    pub navigation_timeout: Duration,

    /// Pause after navigation for late-loading content. Default: 2s.
    pub settle_delay: Duration,

    /// Timeout for the in-page `og:image` fetch. Default: 10s.
    pub image_timeout: Duration,

    /// Cap on bytes accepted from the in-page image fetch. Default: 10 MiB.
    pub max_image_bytes: usize,

    /// Viewport width. Default: 1200.
    pub viewport_width: u32,

    /// Viewport height. Default: 630.
    pub viewport_height: u32,

    /// Screenshot JPEG quality. Default: 90.
    pub screenshot_quality: i64,

    /// Chrome/Chromium binary; autodetected when `None`.
    pub chrome_executable: Option<PathBuf>,

    /// Disable the Chrome sandbox (needed in some containers). Default: false.
    pub no_sandbox: bool,

    /// User agent presented by the browser.
    pub user_agent: String,

    /// Maximum stored title length in characters. Default: 249.
    pub max_title_chars: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            image_timeout: Duration::from_secs(10),
            max_image_bytes: 10 * 1024 * 1024,
            viewport_width: 1200,
            viewport_height: 630,
            screenshot_quality: 90,
            chrome_executable: None,
            no_sandbox: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_title_chars: TITLE_MAX_CHARS,
        }
    }
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }

    pub fn with_no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.no_sandbox = no_sandbox;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Upper bound on a single render, settle and image fetch included.
    pub fn total_budget(&self) -> Duration {
        self.navigation_timeout + self.settle_delay + self.image_timeout + Duration::from_secs(5)
    }
}

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Records processed concurrently. Default: 4.
    pub concurrency: usize,

    /// Records claimed per batch. Default: 16.
    pub batch_size: usize,

    /// Claim lease. Default: 10 minutes.
    pub lease: Duration,

    /// Hard deadline for one record, all stages included. Default: 120s.
    pub record_timeout: Duration,

    /// Sleep between passes in watch mode. Default: 5 minutes.
    pub poll_interval: Duration,

    /// Worker ID used for claims
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 16,
            lease: Duration::from_secs(600),
            record_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(300),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
