//! Link records - the unit of work and the unit of output.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a link record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<i32> for RecordId {
    fn from(id: i32) -> Self {
        Self(id as i64)
    }
}

/// Opaque reference to a stored binary (path, key, or URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An outbound link awaiting (or holding) its preview card.
///
/// A record is pending while `processed_at` is unset. `processed_at` is only
/// ever written together with `image`, so a processed record is always fully
/// enriched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: RecordId,

    /// Absolute, attacker-controlled URL
    pub url: String,

    /// Host with the `www.` prefix stripped
    pub domain: Option<String>,

    /// Preview title, at most 249 characters
    pub title: Option<String>,

    /// Preview description, possibly empty
    pub description: Option<String>,

    /// Normalized thumbnail
    pub image: Option<ImageRef>,

    /// Completion marker
    pub processed_at: Option<DateTime<Utc>>,
}

impl LinkRecord {
    /// Create a pending record carrying only its URL.
    pub fn new(id: impl Into<RecordId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            domain: None,
            title: None,
            description: None,
            image: None,
            processed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }

    /// Apply a partial field update in place.
    pub fn apply(&mut self, update: &RecordUpdate) {
        if let Some(domain) = &update.domain {
            self.domain = Some(domain.clone());
        }
        if let Some(title) = &update.title {
            self.title = Some(title.clone());
        }
        if let Some(description) = &update.description {
            self.description = Some(description.clone());
        }
    }
}

/// Partial update of the plain-text preview fields.
///
/// Safe to apply repeatedly with different subsets; `None` leaves a field
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub domain: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl RecordUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.domain.is_none() && self.title.is_none() && self.description.is_none()
    }
}

/// Parameters for an atomic, leased claim of pending records.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// Worker taking the lease
    pub worker_id: String,

    /// Maximum records to claim
    pub limit: usize,

    /// How long the lease is held before another worker may reclaim it
    pub lease: Duration,

    /// Only records not attempted since this instant are eligible, so a
    /// single pass never retries its own failures.
    pub attempted_before: DateTime<Utc>,
}

impl ClaimRequest {
    pub fn new(worker_id: impl Into<String>, limit: usize, lease: Duration) -> Self {
        Self {
            worker_id: worker_id.into(),
            limit,
            lease,
            attempted_before: Utc::now(),
        }
    }

    pub fn attempted_before(mut self, at: DateTime<Utc>) -> Self {
        self.attempted_before = at;
        self
    }
}
