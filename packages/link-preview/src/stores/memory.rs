//! In-memory storage for testing and development.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{BlobStore, RecordStore};
use crate::types::record::{ClaimRequest, ImageRef, LinkRecord, RecordId, RecordUpdate};

#[derive(Debug, Clone)]
struct Lease {
    worker_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Entry {
    record: LinkRecord,
    lease: Option<Lease>,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn claimable(&self, request: &ClaimRequest, now: DateTime<Utc>) -> bool {
        self.record.is_pending()
            && self.lease.as_ref().map_or(true, |l| l.expires_at <= now)
            && self
                .last_attempt_at
                .map_or(true, |at| at < request.attempted_before)
    }
}

/// In-memory record store.
///
/// Claims are atomic under a single write lock. Data is lost on drop.
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordId, Entry>>,
    clock_offset: ChronoDuration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            clock_offset: ChronoDuration::zero(),
        }
    }

    /// Shift the store's clock relative to the host, as a database server
    /// with a skewed clock would be.
    pub fn with_clock_offset(mut self, offset: ChronoDuration) -> Self {
        self.clock_offset = offset;
        self
    }

    fn clock(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset
    }

    /// Create a store seeded with records.
    pub fn with_records(records: impl IntoIterator<Item = LinkRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: LinkRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                record.id,
                Entry {
                    record,
                    lease: None,
                    last_attempt_at: None,
                },
            );
    }

    /// Snapshot of a record, bypassing the async trait.
    pub fn snapshot(&self, id: RecordId) -> Option<LinkRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|e| e.record.clone())
    }

    /// Worker currently holding an unexpired lease on `id`.
    pub fn lease_holder(&self, id: RecordId) -> Option<String> {
        let now = self.clock();
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .and_then(|e| e.lease.as_ref())
            .filter(|l| l.expires_at > now)
            .map(|l| l.worker_id.clone())
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn now(&self) -> StoreResult<DateTime<Utc>> {
        Ok(self.clock())
    }

    async fn list_pending(&self) -> StoreResult<Vec<LinkRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.record.is_pending())
            .map(|e| e.record.clone())
            .collect())
    }

    async fn get(&self, id: RecordId) -> StoreResult<Option<LinkRecord>> {
        Ok(self.snapshot(id))
    }

    async fn claim_pending(&self, request: &ClaimRequest) -> StoreResult<Vec<LinkRecord>> {
        let now = self.clock();
        let lease = ChronoDuration::from_std(request.lease)
            .map_err(|e| StoreError::Backend(Box::new(e)))?;

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let claimed = records
            .values_mut()
            .filter(|e| e.claimable(request, now))
            .take(request.limit)
            .map(|e| {
                e.lease = Some(Lease {
                    worker_id: request.worker_id.clone(),
                    expires_at: now + lease,
                });
                e.last_attempt_at = Some(now);
                e.record.clone()
            })
            .collect();

        Ok(claimed)
    }

    async fn update(&self, id: RecordId, fields: &RecordUpdate) -> StoreResult<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let entry = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entry.record.apply(fields);
        Ok(())
    }

    async fn commit(&self, id: RecordId, image: &ImageRef) -> StoreResult<bool> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let entry = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if !entry.record.is_pending() {
            return Ok(false);
        }

        entry.record.image = Some(image.clone());
        entry.record.processed_at = Some(self.clock());
        entry.lease = None;
        Ok(true)
    }

    async fn release(&self, id: RecordId, worker_id: &str) -> StoreResult<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = records.get_mut(&id) {
            if entry.lease.as_ref().is_some_and(|l| l.worker_id == worker_id) {
                entry.lease = None;
            }
        }
        Ok(())
    }
}

/// In-memory blob store.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Bytes stored under `image`.
    pub fn get(&self, image: &ImageRef) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(image.as_str())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(
        &self,
        _record_id: RecordId,
        filename: &str,
        bytes: &[u8],
    ) -> StoreResult<ImageRef> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(filename.to_string(), bytes.to_vec());
        Ok(ImageRef(filename.to_string()))
    }
}
