//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawlgate database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- URIs that were dispatched for fetching
CREATE TABLE IF NOT EXISTS visited (
    uri TEXT PRIMARY KEY,
    visited_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_visited_expires ON visited(expires_at);

-- Host-level data used to fill the in-memory host cache
CREATE TABLE IF NOT EXISTS hosts (
    host TEXT PRIMARY KEY,
    is_blocked INTEGER NOT NULL DEFAULT 0,
    robots_txt TEXT,
    robots_fetched_at TEXT
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
