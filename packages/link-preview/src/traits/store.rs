//! Storage traits for link records and thumbnails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::types::record::{ClaimRequest, ImageRef, LinkRecord, RecordId, RecordUpdate};

/// Queue of link records plus field updates.
///
/// Implementations must make `claim_pending` atomic: no two workers may hold
/// the same record at once.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Current time on the clock that stamps claims and attempts.
    ///
    /// `ClaimRequest::attempted_before` must come from here; a worker clock
    /// skewed against the store would otherwise re-claim its own failures.
    async fn now(&self) -> StoreResult<DateTime<Utc>> {
        Ok(Utc::now())
    }

    /// All records with `processed_at` unset. Order is not significant.
    async fn list_pending(&self) -> StoreResult<Vec<LinkRecord>>;

    /// Fetch one record by ID.
    async fn get(&self, id: RecordId) -> StoreResult<Option<LinkRecord>>;

    /// Lease up to `request.limit` pending records to `request.worker_id`.
    ///
    /// Records already leased (unexpired) or attempted at or after
    /// `request.attempted_before` are skipped.
    async fn claim_pending(&self, request: &ClaimRequest) -> StoreResult<Vec<LinkRecord>>;

    /// Partial update of domain/title/description. Idempotent.
    async fn update(&self, id: RecordId, fields: &RecordUpdate) -> StoreResult<()>;

    /// Set `image` and `processed_at` together.
    ///
    /// Returns `false` if the record was already processed, leaving it as is.
    async fn commit(&self, id: RecordId, image: &ImageRef) -> StoreResult<bool>;

    /// Drop a lease so the record is eligible for a later pass.
    async fn release(&self, id: RecordId, worker_id: &str) -> StoreResult<()>;
}

/// Binary storage for normalized thumbnails.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a stable name keyed by the record; returns a
    /// reference to persist on the record. Must not expose partial writes.
    async fn store(&self, record_id: RecordId, filename: &str, bytes: &[u8])
        -> StoreResult<ImageRef>;
}
