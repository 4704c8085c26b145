//! Core trait abstractions.
//!
//! - [`fetcher::Fetcher`] - plain HTTP GET
//! - [`renderer::Renderer`] - headless-browser fallback
//! - [`store::RecordStore`] - queue of link records
//! - [`store::BlobStore`] - binary storage for thumbnails

pub mod fetcher;
pub mod renderer;
pub mod store;
