//! Storage traits and error types
//!
//! This module defines the persistence collaborator the pipeline talks to and
//! its associated error types. Persistence is only a cache-fill source for host
//! state and a record of visited URIs; rate limiting never touches it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Whether a URI has been fetched recently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    /// Never recorded
    Unvisited,
    /// Recorded, but the visit has expired
    Expired,
    /// Recorded and still fresh
    Fresh,
}

/// Host-level data kept across runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredHost {
    /// Every link to this host should be rejected
    pub is_blocked: bool,
    /// When `robots_txt` was downloaded
    pub robots_fetched_at: Option<DateTime<Utc>>,
    /// Raw robots.txt text; `None` with a fetch time means the host had none
    pub robots_txt: Option<String>,
}

/// Trait for persistence backends
///
/// Implementations must be shareable across tasks.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Records a URI as visited until `expires_at`
    async fn save_visited(&self, uri: &str, expires_at: DateTime<Utc>) -> StorageResult<()>;

    /// Looks up the visit state of a URI
    async fn visit_state(&self, uri: &str) -> StorageResult<VisitState>;

    /// True unless the URI was visited and the visit is still fresh
    async fn needs_visiting(&self, uri: &str) -> StorageResult<bool> {
        Ok(self.visit_state(uri).await? != VisitState::Fresh)
    }

    /// Loads the stored record for a host
    async fn get_host_record(&self, host: &str) -> StorageResult<Option<StoredHost>>;

    /// Inserts or replaces the stored record for a host
    async fn save_host_record(&self, host: &str, record: &StoredHost) -> StorageResult<()>;
}
