//! Typed errors for the link-preview pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so the orchestrator
//! can classify every failure before deciding whether to move on to the
//! next strategy or leave the record pending.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Coarse failure classification reported in structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// DNS, connect, timeout, or an unusable URL
    Transport,
    /// Non-2xx response
    HttpStatus,
    /// Body exceeded the configured cap
    PayloadTooLarge,
    /// Unusable HTML or image bytes
    Parse,
    /// Browser navigation or automation failure
    Render,
    /// Image re-encode failure
    Encode,
    /// Record or blob store failure
    Storage,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transport => "transport",
            ErrorClass::HttpStatus => "http_status",
            ErrorClass::PayloadTooLarge => "payload_too_large",
            ErrorClass::Parse => "parse",
            ErrorClass::Render => "render",
            ErrorClass::Encode => "encode",
            ErrorClass::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a plain HTTP fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL could not be parsed or uses a non-HTTP scheme
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// DNS, connect, TLS, or body-read failure
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wall-clock timeout elapsed
    #[error("timeout after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },

    /// Server answered with a non-2xx status
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Body larger than the configured cap
    #[error("response from {url} exceeds {limit} bytes")]
    PayloadTooLarge { url: String, limit: usize },
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::InvalidUrl { .. }
            | FetchError::Transport { .. }
            | FetchError::Timeout { .. } => ErrorClass::Transport,
            FetchError::HttpStatus { .. } => ErrorClass::HttpStatus,
            FetchError::PayloadTooLarge { .. } => ErrorClass::PayloadTooLarge,
        }
    }

    /// Whether the failure happened before any response arrived.
    pub fn is_transport(&self) -> bool {
        self.class() == ErrorClass::Transport
    }
}

/// Errors from thumbnail normalization.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Zero-byte payload
    #[error("empty image payload")]
    Empty,

    /// Corrupt bytes, unsupported format, or decode limits exceeded
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// Re-encode to JPEG failed
    #[error("failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),

    /// Blocking task panicked or was cancelled
    #[error("normalization task failed: {0}")]
    Task(String),
}

impl ImageError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ImageError::Empty | ImageError::Decode(_) => ErrorClass::Parse,
            ImageError::Encode(_) | ImageError::Task(_) => ErrorClass::Encode,
        }
    }
}

/// Errors from the headless-browser fallback.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Browser engine could not be launched; fallback disabled for this run
    #[error("browser engine unavailable: {0}")]
    Unavailable(String),

    /// Isolated browsing context or page could not be created
    #[error("failed to open browsing context: {0}")]
    Context(String),

    /// Navigation failed (network error, crash, bad URL)
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Navigation or settle exceeded the overall timeout
    #[error("render of {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// In-page evaluation or screenshot failed
    #[error("browser automation failed: {0}")]
    Automation(String),
}

impl RenderError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Render
    }
}

/// Errors from the record store or binary storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record does not exist
    #[error("record not found: {0}")]
    NotFound(String),

    /// Backend failure (database, filesystem)
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Filesystem failure while writing a blob
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Storage
    }
}

/// Umbrella error for a single enrichment stage.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EnrichError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EnrichError::Fetch(e) => e.class(),
            EnrichError::Image(e) => e.class(),
            EnrichError::Render(e) => e.class(),
            EnrichError::Store(e) => e.class(),
        }
    }
}

/// Result type alias for fetch operations.
pub type FetchOutcome<T> = std::result::Result<T, FetchError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
