//! Enrichment pipeline.
//!
//! - [`enrich::Enricher`] - lightweight-first orchestration for one record
//! - [`worker::EnrichmentWorker`] - bounded pool with leased claims and
//!   cooperative shutdown
//! - [`outcome`] - per-record outcomes and pass summaries

pub mod enrich;
pub mod outcome;
pub mod worker;

pub use enrich::Enricher;
pub use outcome::{EnrichOutcome, RunSummary, Stage, StageFailure};
pub use worker::EnrichmentWorker;
