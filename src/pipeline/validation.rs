//! Validation stage
//!
//! Batches arrive grouped by target IP. Checks run cheapest first and the
//! first failing check rejects the item; only items that pass every cheap
//! check pay for the robots.txt lookup. Accepted and rejected items leave on
//! separate channels.

use crate::cache::RecencyCache;
use crate::config::ValidationConfig;
use crate::host::HostCache;
use crate::pipeline::stats::PipelineStats;
use crate::state::{FetchStatus, WorkItem};
use crate::{CrawlError, Result};
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Why an item was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    PriorityTooLow,
    QuotaReached,
    AlreadyFlagged,
    Malformed,
    ChunkFull,
    RecentlyScheduled,
    HostBlocked,
    BlockedByRobots,
    /// The host cache failed while checking the item
    CheckFailed,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriorityTooLow => "priority too low",
            Self::QuotaReached => "quota reached",
            Self::AlreadyFlagged => "already flagged",
            Self::Malformed => "malformed",
            Self::ChunkFull => "chunk full",
            Self::RecentlyScheduled => "ip scheduled recently",
            Self::HostBlocked => "host blocked",
            Self::BlockedByRobots => "blocked by robots.txt",
            Self::CheckFailed => "check failed",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Items of one batch split by outcome
#[derive(Debug, Default)]
pub struct Verdict {
    pub accepted: Vec<WorkItem>,
    pub rejected: Vec<WorkItem>,
}

/// Second pipeline stage
pub struct Validator {
    config: ValidationConfig,
    hosts: Arc<HostCache>,
    recent_ips: Mutex<RecencyCache<IpAddr>>,
    accepted_total: AtomicU64,
    stats: Arc<PipelineStats>,
}

impl Validator {
    pub fn new(config: &ValidationConfig, hosts: Arc<HostCache>, stats: Arc<PipelineStats>) -> Self {
        Self {
            config: config.clone(),
            hosts,
            recent_ips: Mutex::new(RecencyCache::new(config.recent_ip_capacity)),
            accepted_total: AtomicU64::new(0),
            stats,
        }
    }

    /// Validates one batch
    ///
    /// A batch that mixes target IPs is split into one chunk per IP, each
    /// checked on its own.
    pub async fn validate(&self, batch: Vec<WorkItem>) -> Verdict {
        let chunks = group_by_ip(batch);
        if chunks.len() > 1 {
            tracing::warn!("Batch mixes {} target IPs, validating per IP", chunks.len());
        }

        let mut verdict = Verdict::default();
        for (ip, items) in chunks {
            self.validate_chunk(ip, items, &mut verdict).await;
        }

        PipelineStats::add(&self.stats.accepted, verdict.accepted.len() as u64);
        PipelineStats::add(&self.stats.rejected, verdict.rejected.len() as u64);
        verdict
    }

    /// Consumes batches until `inbound` closes
    ///
    /// Both outputs are sent concurrently so a slow consumer on one side does
    /// not hold up the other.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<Vec<WorkItem>>,
        accepted: mpsc::Sender<Vec<WorkItem>>,
        rejected: mpsc::Sender<Vec<WorkItem>>,
    ) -> Result<()> {
        while let Some(batch) = inbound.recv().await {
            let verdict = self.validate(batch).await;

            let (sent_accepted, sent_rejected) = tokio::join!(
                forward(&accepted, verdict.accepted, "accepted items"),
                forward(&rejected, verdict.rejected, "rejected items"),
            );
            sent_accepted?;
            sent_rejected?;
        }

        tracing::debug!("Validation input closed");
        Ok(())
    }

    async fn validate_chunk(&self, ip: Option<IpAddr>, items: Vec<WorkItem>, verdict: &mut Verdict) {
        // Judged against the cache as it was before this chunk
        let recently_scheduled = ip.is_some_and(|ip| {
            self.recent_ips
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .contains(&ip)
        });

        for (position, mut item) in items.into_iter().enumerate() {
            match self.check(&mut item, position, recently_scheduled).await {
                None => {
                    self.accepted_total.fetch_add(1, Ordering::AcqRel);
                    verdict.accepted.push(item);
                }
                Some(reason) => {
                    tracing::trace!("Rejected {}: {}", item.target, reason);
                    item.advance(FetchStatus::Discarded);
                    verdict.rejected.push(item);
                }
            }
        }

        if let Some(ip) = ip {
            self.recent_ips
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(ip);
        }
    }

    async fn check(
        &self,
        item: &mut WorkItem,
        position: usize,
        recently_scheduled: bool,
    ) -> Option<Rejection> {
        // Checked first so the flag is set no matter what else is wrong
        if item.priority > self.config.max_priority {
            item.issues.priority_too_low = true;
            return Some(Rejection::PriorityTooLow);
        }

        if self
            .config
            .quota
            .is_some_and(|quota| self.accepted_total.load(Ordering::Acquire) >= quota)
        {
            return Some(Rejection::QuotaReached);
        }

        if item.issues.any() {
            return Some(Rejection::AlreadyFlagged);
        }

        let Some(host) = item.host() else {
            item.issues.malformed = true;
            return Some(Rejection::Malformed);
        };

        if position >= self.config.max_chunk_size {
            return Some(Rejection::ChunkFull);
        }

        if recently_scheduled {
            return Some(Rejection::RecentlyScheduled);
        }

        match self.robots_check(&host, item).await {
            Ok(None) => None,
            Ok(Some(reason)) => Some(reason),
            Err(e) => {
                tracing::warn!("Host check failed for {}: {}", item.target, e);
                Some(Rejection::CheckFailed)
            }
        }
    }

    async fn robots_check(&self, host: &str, item: &mut WorkItem) -> Result<Option<Rejection>> {
        let disallowed = self.hosts.disallowed(host, &item.target).await?;

        // Known once the host's record has been filled from storage
        if self.hosts.is_blocked(host).await? {
            item.issues.domain_blocked = true;
            return Ok(Some(Rejection::HostBlocked));
        }

        if disallowed {
            item.issues.blocked_by_robots = true;
            return Ok(Some(Rejection::BlockedByRobots));
        }

        Ok(None)
    }
}

async fn forward(
    channel: &mpsc::Sender<Vec<WorkItem>>,
    items: Vec<WorkItem>,
    what: &'static str,
) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    channel
        .send(items)
        .await
        .map_err(|_| CrawlError::ChannelClosed(what))
}

/// Splits a batch into per-IP chunks, keeping first-seen order
fn group_by_ip(batch: Vec<WorkItem>) -> Vec<(Option<IpAddr>, Vec<WorkItem>)> {
    let mut chunks: Vec<(Option<IpAddr>, Vec<WorkItem>)> = Vec::new();
    for item in batch {
        match chunks.iter_mut().find(|(ip, _)| *ip == item.ip) {
            Some((_, items)) => items.push(item),
            None => chunks.push((item.ip, vec![item])),
        }
    }
    chunks
}
