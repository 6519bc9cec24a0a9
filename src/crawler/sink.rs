//! Where fetch results go
//!
//! A failed write here is fatal for the whole run: the orchestrator stops
//! instead of silently losing results.

use crate::crawler::FetchOutcome;
use crate::state::WorkItem;
use crate::{CrawlError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Receives every completed fetch
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn record(&self, item: &WorkItem, outcome: &FetchOutcome) -> Result<()>;

    /// Pushes buffered output to its destination
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Appends one tab-separated line per fetch to a file
///
/// Each line is the item's interchange form followed by the outcome. Every
/// line is flushed as it is recorded, so a full disk surfaces on the fetch
/// that hit it.
pub struct TsvSink<W = tokio::fs::File> {
    writer: tokio::sync::Mutex<BufWriter<W>>,
}

impl TsvSink {
    /// Opens `path` for appending, creating it if needed
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::from_writer(file))
    }
}

impl<W> TsvSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(BufWriter::new(writer)),
        }
    }
}

#[async_trait]
impl<W> OutputSink for TsvSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn record(&self, item: &WorkItem, outcome: &FetchOutcome) -> Result<()> {
        let line = format!("{}\t{}\n", item.to_line(), outcome);
        let mut writer = self.writer.lock().await;
        let written = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| CrawlError::FatalOutput {
            url: item.target.to_string(),
            message: e.to_string(),
        })
    }

    async fn flush(&self) -> Result<()> {
        self.writer
            .lock()
            .await
            .flush()
            .await
            .map_err(|e| CrawlError::FatalOutput {
                url: "buffered results".to_string(),
                message: e.to_string(),
            })
    }
}

/// Keeps results in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(WorkItem, FetchOutcome)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn records(&self) -> Vec<(WorkItem, FetchOutcome)> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn record(&self, item: &WorkItem, outcome: &FetchOutcome) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((item.clone(), outcome.clone()));
        Ok(())
    }
}
