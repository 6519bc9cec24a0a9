//! In-process storage backend

use crate::storage::traits::{Persistence, StorageResult, StoredHost, VisitState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    visited: HashMap<String, DateTime<Utc>>,
    hosts: HashMap<String, StoredHost>,
}

/// Keeps everything in hash maps; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a host as blocked, keeping any robots data already stored
    pub fn block_host(&self, host: &str) {
        self.tables()
            .hosts
            .entry(host.to_string())
            .or_default()
            .is_blocked = true;
    }

    /// All URIs recorded as visited, in no particular order
    pub fn visited(&self) -> Vec<String> {
        self.tables().visited.keys().cloned().collect()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn save_visited(&self, uri: &str, expires_at: DateTime<Utc>) -> StorageResult<()> {
        self.tables().visited.insert(uri.to_string(), expires_at);
        Ok(())
    }

    async fn visit_state(&self, uri: &str) -> StorageResult<VisitState> {
        Ok(match self.tables().visited.get(uri) {
            None => VisitState::Unvisited,
            Some(expires_at) if *expires_at <= Utc::now() => VisitState::Expired,
            Some(_) => VisitState::Fresh,
        })
    }

    async fn get_host_record(&self, host: &str) -> StorageResult<Option<StoredHost>> {
        Ok(self.tables().hosts.get(host).cloned())
    }

    async fn save_host_record(&self, host: &str, record: &StoredHost) -> StorageResult<()> {
        self.tables()
            .hosts
            .insert(host.to_string(), record.clone());
        Ok(())
    }
}
