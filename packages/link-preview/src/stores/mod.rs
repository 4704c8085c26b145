//! Storage implementations.
//!
//! Record stores:
//! - `MemoryStore` - in-memory (always available)
//! - `PostgresStore` - PostgreSQL (requires `postgres` feature)
//!
//! Blob stores:
//! - `FsBlobStore` - files under a media root
//! - `MemoryBlobStore` - in-memory, for tests

pub mod fs;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use fs::FsBlobStore;
pub use memory::{MemoryBlobStore, MemoryStore};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
