//! Per-IP fetch queues
//!
//! Work is grouped by target IP. Each IP gets a FIFO queue and, while the queue
//! exists, exactly one worker draining it. An emptied queue is not removed
//! right away: removal is scheduled after a grace period and only happens if
//! the queue is still empty and was not refilled in between. All structural
//! changes go through one lock over the whole map.

use crate::state::WorkItem;
use crate::{CrawlError, Result};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
struct IpQueue {
    id: u64,
    items: VecDeque<WorkItem>,
    // Bumped on every refill so a pending removal can tell it is outdated
    epoch: u64,
}

/// Result of [`FetchQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub ip: IpAddr,
    /// Identity of the queue the items landed in
    pub queue_id: u64,
    /// True if the queue did not exist before; the caller should start a worker
    pub created: bool,
}

/// Result of [`FetchQueue::dequeue`]
#[derive(Debug)]
pub enum Dequeued {
    Item(WorkItem),
    /// Queue exists but is empty; more work may still arrive within the grace period
    Empty,
    /// Queue was removed (or replaced); the worker should stop
    Gone,
}

/// Map of per-IP FIFO queues with delayed removal
#[derive(Debug, Clone)]
pub struct FetchQueue {
    queues: Arc<Mutex<HashMap<IpAddr, IpQueue>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    grace: Duration,
}

impl FetchQueue {
    pub fn new(grace: Duration) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            grace,
        }
    }

    /// Appends a batch that shares one target IP
    ///
    /// Fails if any item lacks an IP or the batch mixes IPs.
    pub async fn enqueue(&self, items: Vec<WorkItem>) -> Result<Enqueued> {
        let ip = common_ip(&items)?;

        let mut queues = self.queues.lock().await;
        let mut created = false;
        let queue = queues.entry(ip).or_insert_with(|| {
            created = true;
            IpQueue {
                id: self
                    .next_id
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
                items: VecDeque::new(),
                epoch: 0,
            }
        });

        queue.items.extend(items);
        queue.epoch += 1;

        Ok(Enqueued {
            ip,
            queue_id: queue.id,
            created,
        })
    }

    /// Pops the next item for `ip`
    ///
    /// `queue_id` ties the caller to the queue it was started for, so a worker
    /// from a removed queue never drains a newer one for the same IP.
    pub async fn dequeue(&self, ip: IpAddr, queue_id: u64) -> Dequeued {
        let mut queues = self.queues.lock().await;
        let Some(queue) = queues.get_mut(&ip).filter(|q| q.id == queue_id) else {
            return Dequeued::Gone;
        };

        let Some(item) = queue.items.pop_front() else {
            return Dequeued::Empty;
        };

        if queue.items.is_empty() {
            self.schedule_removal(ip, queue_id, queue.epoch);
        }

        Dequeued::Item(item)
    }

    /// Drops the queue for `ip` immediately, returning whatever was left in it
    pub async fn remove_queue(&self, ip: IpAddr) -> Vec<WorkItem> {
        self.queues
            .lock()
            .await
            .remove(&ip)
            .map(|q| q.items.into())
            .unwrap_or_default()
    }

    pub async fn contains(&self, ip: IpAddr) -> bool {
        self.queues.lock().await.contains_key(&ip)
    }

    /// Number of items waiting for `ip`
    pub async fn queued(&self, ip: IpAddr) -> usize {
        self.queues
            .lock()
            .await
            .get(&ip)
            .map_or(0, |q| q.items.len())
    }

    /// Number of live queues
    pub async fn len(&self) -> usize {
        self.queues.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queues.lock().await.is_empty()
    }

    fn schedule_removal(&self, ip: IpAddr, queue_id: u64, epoch: u64) {
        let queues = self.queues.clone();
        let grace = self.grace;

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut queues = queues.lock().await;
            let stale = queues
                .get(&ip)
                .is_some_and(|q| q.id == queue_id && q.epoch == epoch && q.items.is_empty());
            if stale {
                queues.remove(&ip);
                tracing::trace!("Removed idle queue for {}", ip);
            }
        });
    }
}

fn common_ip(items: &[WorkItem]) -> Result<IpAddr> {
    let mut ips = items.iter().map(|item| item.ip);
    let first = ips.next().flatten().ok_or(CrawlError::UnresolvedBatch)?;

    for ip in ips {
        match ip {
            None => return Err(CrawlError::UnresolvedBatch),
            Some(other) if other != first => return Err(CrawlError::MixedBatch { first, other }),
            Some(_) => {}
        }
    }

    Ok(first)
}
