//! Link Preview Enrichment
//!
//! Fills a queue of outbound link records with a preview card: title,
//! description, source domain and a fixed-size thumbnail.
//!
//! # Strategy
//!
//! 1. **Lightweight** - plain HTTP fetch, Open Graph extraction, `og:image`
//!    fetch and normalization. The common case.
//! 2. **Fallback** - headless Chromium renders the page in an isolated
//!    context, re-extracts metadata from the live DOM and supplies either the
//!    page's `og:image` or a viewport screenshot.
//!
//! A record is committed (image and `processed_at` together) only once an
//! image has been normalized and stored. Anything else leaves it pending for
//! the next run.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use link_preview::{ChromiumRenderer, Enricher, EnrichmentWorker, FsBlobStore, HttpFetcher};
//! use link_preview::{MemoryStore, RenderConfig, WorkerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let enricher = Enricher::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(FsBlobStore::new("./media", "link_previews")),
//!     Arc::new(HttpFetcher::new()?),
//!     Arc::new(ChromiumRenderer::new(RenderConfig::default())),
//! );
//!
//! let worker = EnrichmentWorker::with_config(Arc::new(enricher), WorkerConfig::default());
//! let summary = worker.run(false, CancellationToken::new()).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Fetcher, Renderer, RecordStore, BlobStore)
//! - [`types`] - Records, metadata, fetch and configuration types
//! - [`extract`] - Open Graph metadata extraction
//! - [`thumbnail`] - Image normalization
//! - [`render`] - Headless Chromium fallback
//! - [`pipeline`] - Orchestration and the worker pool
//! - [`stores`] - Record and blob storage implementations
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod extract;
pub mod fetchers;
pub mod pipeline;
pub mod render;
pub mod stores;
pub mod testing;
pub mod thumbnail;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    EnrichError, ErrorClass, FetchError, FetchOutcome, ImageError, RenderError, StoreError,
    StoreResult,
};
pub use traits::{
    fetcher::Fetcher,
    renderer::{ImageSource, RenderedPage, Renderer},
    store::{BlobStore, RecordStore},
};
pub use types::{
    config::{EnrichConfig, NormalizeConfig, RenderConfig, WorkerConfig, DEFAULT_USER_AGENT},
    fetch::{FetchOptions, FetchResult},
    metadata::{derive_domain, truncate_title, ExtractedMetadata, TITLE_MAX_CHARS},
    record::{ClaimRequest, ImageRef, LinkRecord, RecordId, RecordUpdate},
};

pub use extract::{decode_html, extract_metadata, extract_metadata_with_limit};
pub use thumbnail::{normalize, normalize_blocking, NormalizedImage};

// Re-export pipeline components
pub use pipeline::{EnrichOutcome, Enricher, EnrichmentWorker, RunSummary, Stage};

// Re-export implementations
pub use fetchers::HttpFetcher;
pub use render::ChromiumRenderer;
pub use stores::{FsBlobStore, MemoryBlobStore, MemoryStore};

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

// Re-export testing utilities
pub use testing::{MockFetcher, MockRenderer};
