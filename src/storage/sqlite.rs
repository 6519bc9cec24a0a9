//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Persistence trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Persistence, StorageError, StorageResult, StoredHost, VisitState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
///
/// The connection sits behind a mutex; every statement is short, so callers
/// never hold it across an await point.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of URIs recorded as visited
    pub fn count_visited(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM visited", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Deletes visits that expired before `now`; returns how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        let removed = self.conn().execute(
            "DELETE FROM visited WHERE expires_at < ?1",
            params![now.to_rfc3339()],
        )?;
        Ok(removed)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves the connection itself usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}

#[async_trait]
impl Persistence for SqliteStore {
    async fn save_visited(&self, uri: &str, expires_at: DateTime<Utc>) -> StorageResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO visited (uri, visited_at, expires_at) VALUES (?1, ?2, ?3)",
            params![uri, Utc::now().to_rfc3339(), expires_at.to_rfc3339()],
        )?;
        Ok(())
    }

    async fn visit_state(&self, uri: &str) -> StorageResult<VisitState> {
        let expires_at: Option<String> = self
            .conn()
            .query_row(
                "SELECT expires_at FROM visited WHERE uri = ?1",
                params![uri],
                |row| row.get(0),
            )
            .optional()?;

        match expires_at {
            None => Ok(VisitState::Unvisited),
            Some(value) if parse_timestamp(&value)? <= Utc::now() => Ok(VisitState::Expired),
            Some(_) => Ok(VisitState::Fresh),
        }
    }

    async fn get_host_record(&self, host: &str) -> StorageResult<Option<StoredHost>> {
        let row: Option<(bool, Option<String>, Option<String>)> = self
            .conn()
            .query_row(
                "SELECT is_blocked, robots_txt, robots_fetched_at FROM hosts WHERE host = ?1",
                params![host],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((is_blocked, robots_txt, fetched_at)) = row else {
            return Ok(None);
        };

        Ok(Some(StoredHost {
            is_blocked,
            robots_fetched_at: fetched_at.as_deref().map(parse_timestamp).transpose()?,
            robots_txt,
        }))
    }

    async fn save_host_record(&self, host: &str, record: &StoredHost) -> StorageResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO hosts (host, is_blocked, robots_txt, robots_fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                host,
                record.is_blocked,
                record.robots_txt,
                record.robots_fetched_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }
}
