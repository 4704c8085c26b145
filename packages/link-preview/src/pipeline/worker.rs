//! Enrichment worker - drains pending records with a bounded pool.
//!
//! Each pass repeatedly claims a batch under a lease, processes it with at
//! most `concurrency` records in flight, and releases whatever did not
//! complete. Claims only consider records not attempted since the pass
//! started, so failures wait for the next pass instead of spinning. The pass
//! start is read from the store's clock, the same clock that stamps attempts.
//!
//! Once the shutdown token is cancelled no further batches are claimed;
//! records already in flight run to completion.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::enrich::Enricher;
use super::outcome::{EnrichOutcome, RunSummary};
use crate::error::StoreResult;
use crate::traits::fetcher::Fetcher;
use crate::traits::renderer::Renderer;
use crate::traits::store::{BlobStore, RecordStore};
use crate::types::config::WorkerConfig;
use crate::types::record::{ClaimRequest, LinkRecord};

pub struct EnrichmentWorker<S, B, F, R>
where
    S: RecordStore,
    B: BlobStore,
    F: Fetcher,
    R: Renderer,
{
    enricher: Arc<Enricher<S, B, F, R>>,
    config: WorkerConfig,
}

impl<S, B, F, R> EnrichmentWorker<S, B, F, R>
where
    S: RecordStore,
    B: BlobStore,
    F: Fetcher,
    R: Renderer,
{
    pub fn new(enricher: Arc<Enricher<S, B, F, R>>) -> Self {
        Self::with_config(enricher, WorkerConfig::default())
    }

    pub fn with_config(enricher: Arc<Enricher<S, B, F, R>>, config: WorkerConfig) -> Self {
        Self { enricher, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn enricher(&self) -> &Arc<Enricher<S, B, F, R>> {
        &self.enricher
    }

    /// One pass over the pending queue.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> StoreResult<RunSummary> {
        let pass_start = self.enricher.store().now().await?;
        let mut summary = RunSummary::default();

        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, not claiming more links");
                break;
            }

            let request = ClaimRequest::new(
                self.config.worker_id.clone(),
                self.config.batch_size,
                self.config.lease,
            )
            .attempted_before(pass_start);

            let batch = self.enricher.store().claim_pending(&request).await?;
            if batch.is_empty() {
                break;
            }

            debug!(count = batch.len(), "Claimed links");
            summary.claimed += batch.len();

            let outcomes: Vec<EnrichOutcome> = futures::stream::iter(batch)
                .map(|record| self.process_claimed(record))
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

            for outcome in &outcomes {
                summary.record(outcome);
            }
        }

        if summary.claimed == 0 {
            info!("No pending links");
        } else {
            info!(
                claimed = summary.claimed,
                lightweight = summary.lightweight,
                fallback = summary.fallback,
                pending = summary.pending,
                skipped = summary.skipped,
                "Enrichment pass complete"
            );
        }

        Ok(summary)
    }

    /// Run passes until the queue is drained, or in watch mode until
    /// `shutdown` is cancelled, sleeping `poll_interval` between passes.
    pub async fn run(&self, watch: bool, shutdown: CancellationToken) -> StoreResult<RunSummary> {
        info!(
            worker_id = %self.config.worker_id,
            concurrency = self.config.concurrency,
            batch_size = self.config.batch_size,
            watch,
            "Enrichment worker starting"
        );

        let mut total = RunSummary::default();
        loop {
            match self.run_once(&shutdown).await {
                Ok(summary) => total.merge(&summary),
                Err(e) if watch => error!(error = %e, "Enrichment pass failed"),
                Err(e) => return Err(e),
            }

            if !watch || shutdown.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(
            lightweight = total.lightweight,
            fallback = total.fallback,
            pending = total.pending,
            "Enrichment worker stopped"
        );
        Ok(total)
    }

    async fn process_claimed(&self, record: LinkRecord) -> EnrichOutcome {
        let outcome =
            match tokio::time::timeout(self.config.record_timeout, self.enricher.process(&record))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        record_id = %record.id,
                        url = %record.url,
                        timeout_secs = self.config.record_timeout.as_secs(),
                        error_class = "transport",
                        "Record deadline exceeded, left pending"
                    );
                    EnrichOutcome::TimedOut
                }
            };

        if !outcome.is_committed() {
            if let Err(e) = self
                .enricher
                .store()
                .release(record.id, &self.config.worker_id)
                .await
            {
                warn!(record_id = %record.id, error = %e, "Failed to release claim");
            }
        }

        outcome
    }
}
