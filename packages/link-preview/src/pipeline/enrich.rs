//! The Enricher - runs one link record through the preview pipeline.
//!
//! Lightweight path first: fetch the page, extract Open Graph metadata,
//! fetch and normalize `og:image`. If that yields no usable image the
//! headless-browser fallback re-derives metadata and an image from the
//! executed page, and its values win. Either way the image is normalized
//! and stored before the record is committed, so `processed_at` is only ever
//! set alongside a complete image.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use super::outcome::{EnrichOutcome, Stage, StageFailure};
use crate::error::{FetchError, StoreError};
use crate::extract::extract_metadata_with_limit;
use crate::thumbnail::normalize_blocking;
use crate::traits::fetcher::Fetcher;
use crate::traits::renderer::{ImageSource, Renderer};
use crate::traits::store::{BlobStore, RecordStore};
use crate::types::config::EnrichConfig;
use crate::types::metadata::derive_domain;
use crate::types::record::{ImageRef, LinkRecord, RecordId, RecordUpdate};

/// Enrichment orchestrator.
///
/// # Example
///
/// ```rust,ignore
/// let enricher = Enricher::new(
///     Arc::new(store),
///     Arc::new(FsBlobStore::new("./media", "link_previews")),
///     Arc::new(HttpFetcher::new()?),
///     Arc::new(ChromiumRenderer::new(RenderConfig::default())),
/// );
///
/// let outcome = enricher.process(&record).await;
/// ```
pub struct Enricher<S, B, F, R>
where
    S: RecordStore,
    B: BlobStore,
    F: Fetcher,
    R: Renderer,
{
    store: Arc<S>,
    blobs: Arc<B>,
    fetcher: Arc<F>,
    renderer: Arc<R>,
    config: EnrichConfig,
}

impl<S, B, F, R> Enricher<S, B, F, R>
where
    S: RecordStore,
    B: BlobStore,
    F: Fetcher,
    R: Renderer,
{
    /// Create a new enricher with default configuration.
    pub fn new(store: Arc<S>, blobs: Arc<B>, fetcher: Arc<F>, renderer: Arc<R>) -> Self {
        Self::with_config(store, blobs, fetcher, renderer, EnrichConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        store: Arc<S>,
        blobs: Arc<B>,
        fetcher: Arc<F>,
        renderer: Arc<R>,
        config: EnrichConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            fetcher,
            renderer,
            config,
        }
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<B> {
        &self.blobs
    }

    pub fn fetcher(&self) -> &Arc<F> {
        &self.fetcher
    }

    pub fn renderer(&self) -> &Arc<R> {
        &self.renderer
    }

    /// Load one record by ID and process it. Claims nothing.
    pub async fn process_by_id(&self, id: RecordId) -> Result<EnrichOutcome, StoreError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(self.process(&record).await)
    }

    /// Enrich one record. Never fails: every error is classified, logged and
    /// folded into the outcome.
    #[instrument(skip(self, record), fields(record_id = %record.id, url = %record.url))]
    pub async fn process(&self, record: &LinkRecord) -> EnrichOutcome {
        if !record.is_pending() {
            debug!("Already processed, skipping");
            return EnrichOutcome::Skipped;
        }
        let id = record.id;

        if let Some(domain) = derive_domain(&record.url) {
            if let Err(e) = self.store.update(id, &RecordUpdate::domain(domain)).await {
                return self.give_up(record, StageFailure::new(Stage::Store, e));
            }
        }

        let url = match Url::parse(record.url.trim()) {
            Ok(url) => url,
            Err(_) => {
                let failure = StageFailure::new(
                    Stage::PageFetch,
                    FetchError::InvalidUrl {
                        url: record.url.clone(),
                    },
                );
                return self.give_up(record, failure);
            }
        };

        match self.try_lightweight(id, &url).await {
            Ok(Some(image)) => {
                return self
                    .commit(record, image, |image| EnrichOutcome::Lightweight { image })
                    .await;
            }
            Ok(None) => {
                debug!("No og:image found, falling back to renderer");
            }
            Err(failure) => {
                info!(
                    stage = %failure.stage,
                    error_class = %failure.class(),
                    error = %failure.error,
                    "Lightweight path failed, falling back to renderer"
                );
            }
        }

        match self.try_fallback(id, &url).await {
            Ok((image, source)) => {
                self.commit(record, image, |image| EnrichOutcome::Fallback { image, source })
                    .await
            }
            Err(failure) => self.give_up(record, failure),
        }
    }

    /// Page fetch, extraction and `og:image`. `Ok(None)` means the page had
    /// no image candidate.
    async fn try_lightweight(&self, id: RecordId, url: &Url) -> Result<Option<ImageRef>, StageFailure> {
        let page = self
            .fetcher
            .fetch(url, &self.config.page_fetch())
            .await
            .map_err(|e| StageFailure::new(Stage::PageFetch, e))?;

        let metadata = extract_metadata_with_limit(
            &page.body,
            page.content_type(),
            &page.final_url,
            self.config.max_title_chars,
        );
        debug!(
            title = %metadata.title,
            has_image = metadata.has_image(),
            "Extracted page metadata"
        );

        // Plain-text fields may land ahead of the image; a retry overwrites them.
        let update = RecordUpdate::new()
            .with_title(metadata.title.clone())
            .with_description(metadata.description.clone());
        self.store
            .update(id, &update)
            .await
            .map_err(|e| StageFailure::new(Stage::Store, e))?;

        let Some(image_url) = metadata.image_url else {
            return Ok(None);
        };

        let image = self
            .fetcher
            .fetch(&image_url, &self.config.image_fetch())
            .await
            .map_err(|e| StageFailure::new(Stage::ImageFetch, e))?;

        let normalized = normalize_blocking(image.body, self.config.normalize.clone())
            .await
            .map_err(|e| StageFailure::new(Stage::Normalize, e))?;

        let stored = self
            .blobs
            .store(id, &self.config.lightweight_filename(id), &normalized.bytes)
            .await
            .map_err(|e| StageFailure::new(Stage::Store, e))?;

        Ok(Some(stored))
    }

    /// Full render. Metadata is written only once the image is stored.
    async fn try_fallback(&self, id: RecordId, url: &Url) -> Result<(ImageRef, ImageSource), StageFailure> {
        let rendered = self
            .renderer
            .render(url, self.config.render_timeout)
            .await
            .map_err(|e| StageFailure::new(Stage::Render, e))?;

        let normalized = normalize_blocking(rendered.image, self.config.normalize.clone())
            .await
            .map_err(|e| StageFailure::new(Stage::Normalize, e))?;

        let stored = self
            .blobs
            .store(id, &self.config.fallback_filename(id), &normalized.bytes)
            .await
            .map_err(|e| StageFailure::new(Stage::Store, e))?;

        let update = RecordUpdate::new()
            .with_domain(derive_domain(rendered.final_url.as_str()))
            .with_title(rendered.metadata.title)
            .with_description(rendered.metadata.description);
        self.store
            .update(id, &update)
            .await
            .map_err(|e| StageFailure::new(Stage::Store, e))?;

        Ok((stored, rendered.image_source))
    }

    async fn commit(
        &self,
        record: &LinkRecord,
        image: ImageRef,
        outcome: impl FnOnce(ImageRef) -> EnrichOutcome,
    ) -> EnrichOutcome {
        match self.store.commit(record.id, &image).await {
            Ok(true) => {
                let outcome = outcome(image);
                info!(image = %outcome.image().map(ImageRef::as_str).unwrap_or_default(), "Link enriched");
                outcome
            }
            Ok(false) => {
                debug!("Record was completed concurrently, leaving it as is");
                EnrichOutcome::Skipped
            }
            Err(e) => self.give_up(record, StageFailure::new(Stage::Commit, e)),
        }
    }

    fn give_up(&self, record: &LinkRecord, failure: StageFailure) -> EnrichOutcome {
        warn!(
            record_id = %record.id,
            url = %record.url,
            stage = %failure.stage,
            error_class = %failure.class(),
            error = %failure.error,
            "Enrichment failed, record left pending"
        );
        EnrichOutcome::pending(&failure)
    }
}
