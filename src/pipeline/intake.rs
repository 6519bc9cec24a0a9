//! Link intake: dedup, enrichment and per-IP batching
//!
//! Every submitted link is normalized and checked against a bounded dedup
//! window. New links are enriched on a bounded pool of tasks (DNS, cheap block
//! heuristics, visit history) and collected into one buffer per target IP.
//! A full buffer, or too many open buffers, triggers a flush: the priority
//! model runs over the batch, sequence numbers are stamped, and the batch goes
//! downstream to validation.

use crate::cache::RecencyCache;
use crate::config::IntakeConfig;
use crate::crawler::Resolver;
use crate::hash::{Hash128, HashRange};
use crate::pipeline::priority::PriorityModel;
use crate::pipeline::stats::PipelineStats;
use crate::state::{FetchStatus, WorkItem};
use crate::storage::{Persistence, VisitState};
use crate::url::{normalize_url, resolve_link, UrlScreen};
use crate::{CrawlError, Result};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use url::Url;

/// First pipeline stage
pub struct LinkIntake {
    dedup: Mutex<RecencyCache<Hash128>>,
    partition: Option<HashRange>,
    screen: UrlScreen,
    resolver: Arc<dyn Resolver>,
    persistence: Option<Arc<dyn Persistence>>,
    priority: Arc<dyn PriorityModel>,
    tasks: Arc<Semaphore>,
    max_tasks: u32,
    max_batch_size: usize,
    max_open_buffers: usize,
    buffers: tokio::sync::Mutex<HashMap<Option<IpAddr>, Vec<WorkItem>>>,
    sequence: AtomicU64,
    downstream: Mutex<Option<mpsc::Sender<Vec<WorkItem>>>>,
    closed: AtomicBool,
    stats: Arc<PipelineStats>,
}

impl LinkIntake {
    pub fn new(
        config: &IntakeConfig,
        resolver: Arc<dyn Resolver>,
        persistence: Option<Arc<dyn Persistence>>,
        priority: Arc<dyn PriorityModel>,
        downstream: mpsc::Sender<Vec<WorkItem>>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let max_tasks = u32::try_from(config.max_enrichment_tasks.max(1)).unwrap_or(u32::MAX);
        let partition = config
            .partition
            .as_ref()
            .and_then(|p| HashRange::partition(p.index, p.count));

        Self {
            dedup: Mutex::new(RecencyCache::new(config.dedup_capacity)),
            partition,
            screen: UrlScreen::from_config(config),
            resolver,
            persistence,
            priority,
            tasks: Arc::new(Semaphore::new(max_tasks as usize)),
            max_tasks,
            max_batch_size: config.max_batch_size.max(1),
            max_open_buffers: config.max_open_buffers.max(1),
            buffers: tokio::sync::Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            downstream: Mutex::new(Some(downstream)),
            closed: AtomicBool::new(false),
            stats,
        }
    }

    /// Takes one discovered link
    ///
    /// Returns `Ok(false)` if the link was dropped before enrichment
    /// (duplicate, or owned by another node's partition). Waits when the
    /// enrichment pool is full.
    pub async fn submit(self: &Arc<Self>, mut item: WorkItem) -> Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CrawlError::Disposed { what: "link intake" });
        }
        PipelineStats::add(&self.stats.submitted, 1);

        if let Ok(normalized) = normalize_url(item.target.as_str()) {
            item.target = normalized;
        }

        if !self.in_partition(&item) {
            tracing::trace!("{} belongs to another partition", item.target);
            PipelineStats::add(&self.stats.foreign, 1);
            return Ok(false);
        }

        let fresh = self
            .dedup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(Hash128::of_str(item.target.as_str()));
        if !fresh {
            tracing::trace!("Duplicate link {}", item.target);
            PipelineStats::add(&self.stats.duplicates, 1);
            return Ok(false);
        }

        let permit = self
            .tasks
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CrawlError::Disposed { what: "link intake" })?;

        let intake = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(item) = intake.enrich(item).await {
                if let Err(e) = intake.buffer(item).await {
                    tracing::warn!("Failed to forward enriched batch: {}", e);
                }
            }
            drop(permit);
        });

        Ok(true)
    }

    /// Resolves `link` against the page it was found on and submits it
    pub async fn submit_link(self: &Arc<Self>, source: Option<&Url>, link: &str) -> Result<bool> {
        let target = resolve_link(source, link)?;
        self.submit(WorkItem::new(target, source.cloned())).await
    }

    /// Stops accepting links, waits for enrichment to finish and flushes every buffer
    ///
    /// The downstream channel is closed afterwards.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);

        // Holding every permit means no enrichment task is still running
        let _all = self
            .tasks
            .acquire_many(self.max_tasks)
            .await
            .map_err(|_| CrawlError::Disposed { what: "link intake" })?;

        let pending: Vec<Vec<WorkItem>> = {
            let mut buffers = self.buffers.lock().await;
            buffers.drain().map(|(_, batch)| batch).collect()
        };

        let mut result = Ok(());
        for batch in pending {
            if let Err(e) = self.flush(batch).await {
                result = Err(e);
            }
        }

        self.downstream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.tasks.close();
        result
    }

    fn in_partition(&self, item: &WorkItem) -> bool {
        match (&self.partition, item.host()) {
            (Some(range), Some(host)) => range.contains(Hash128::of_str(&host)),
            _ => true,
        }
    }

    async fn enrich(&self, mut item: WorkItem) -> Option<WorkItem> {
        if let Some(host) = item.host() {
            item.ip = self.resolver.resolve(&host).await;
            if item.ip.is_none() {
                tracing::debug!("Could not resolve {}", host);
            }
            if self.screen.domain_blocked(&host) {
                item.issues.domain_blocked = true;
            }
        }

        if self.screen.unsupported_scheme(&item.target) {
            item.issues.unsupported_scheme = true;
        }
        if self.screen.probably_blocked(&item.target) {
            item.issues.probably_blocked = true;
        }

        if !item.issues.any() {
            if let Some(persistence) = &self.persistence {
                match persistence.visit_state(item.target.as_str()).await {
                    Ok(VisitState::Fresh) => {
                        tracing::trace!("{} was visited recently", item.target);
                        PipelineStats::add(&self.stats.fresh, 1);
                        item.advance(FetchStatus::Discarded);
                        return None;
                    }
                    Ok(VisitState::Expired) => item.revisit = true,
                    Ok(VisitState::Unvisited) => {}
                    Err(e) => tracing::warn!("Visit lookup failed for {}: {}", item.target, e),
                }
            }
        }

        item.advance(FetchStatus::Queuing);
        PipelineStats::add(&self.stats.enriched, 1);
        Some(item)
    }

    async fn buffer(&self, item: WorkItem) -> Result<()> {
        let ready: Vec<Vec<WorkItem>> = {
            let mut buffers = self.buffers.lock().await;
            let key = item.ip;
            buffers.entry(key).or_default().push(item);

            if buffers.len() >= self.max_open_buffers {
                // At the ceiling every open buffer goes out
                buffers.drain().map(|(_, batch)| batch).collect()
            } else if buffers.get(&key).map_or(0, Vec::len) >= self.max_batch_size {
                buffers.remove(&key).into_iter().collect()
            } else {
                Vec::new()
            }
        };

        let mut result = Ok(());
        for batch in ready {
            if let Err(e) = self.flush(batch).await {
                result = Err(e);
            }
        }
        result
    }

    async fn flush(&self, mut batch: Vec<WorkItem>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        self.priority.calculate(&mut batch);
        let first = self
            .sequence
            .fetch_add(batch.len() as u64, Ordering::AcqRel);
        for (offset, item) in batch.iter_mut().enumerate() {
            item.sequence = first + offset as u64;
        }

        let downstream = self
            .downstream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(CrawlError::ChannelClosed("intake output"))?;

        tracing::debug!(
            "Flushing {} items for {}",
            batch.len(),
            batch[0]
                .ip
                .map_or_else(|| "unresolved hosts".to_string(), |ip| ip.to_string())
        );
        downstream
            .send(batch)
            .await
            .map_err(|_| CrawlError::ChannelClosed("validation input"))
    }
}
