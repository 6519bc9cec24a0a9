//! Storage module for persisting crawl data
//!
//! This module handles persistence for the pipeline:
//! - Visited URIs with an expiry, so fresh pages are not fetched again
//! - Host records (blocked flag, last robots.txt) used to fill the host cache
//! - SQLite and in-memory backends behind the [`Persistence`] trait

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Persistence, StorageError, StorageResult, StoredHost, VisitState};

use std::path::Path;

/// Opens the SQLite database at `path`, creating it if needed
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::open(path)
}
