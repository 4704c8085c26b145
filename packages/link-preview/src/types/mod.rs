//! Domain types for link-preview enrichment.

pub mod config;
pub mod fetch;
pub mod metadata;
pub mod record;
