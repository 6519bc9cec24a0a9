//! Fetch orchestrator
//!
//! Accepted batches are queued per target IP. The first batch for an IP
//! starts a worker for it, bounded by a global slot semaphore. A worker
//! drains its queue one item at a time: it spaces fetches by the minimum
//! interval, passes each item through the pressure valve (which waits on the
//! host's politeness gate and sheds back to the run loop when too many
//! workers are stuck waiting), fetches, and records the outcome. A host that
//! keeps failing at the network level loses its whole queue.

use crate::config::{Config, LiveSettings, SchedulerConfig};
use crate::crawler::{FetchOutcome, Fetcher, OutputSink};
use crate::host::HostCache;
use crate::pipeline::stats::PipelineStats;
use crate::queue::{Dequeued, FetchQueue};
use crate::state::{FetchStatus, WorkItem};
use crate::storage::Persistence;
use crate::valve::{PressureValve, ValveHandler};
use crate::{CrawlError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

/// Valve handler that waits on the host's politeness gate
struct HostGate {
    hosts: Arc<HostCache>,
    wait: Duration,
    requeue: mpsc::Sender<WorkItem>,
    stats: Arc<PipelineStats>,
}

#[async_trait]
impl ValveHandler<WorkItem> for HostGate {
    async fn wait(&self, item: &WorkItem) -> Result<bool> {
        match item.host() {
            Some(host) => self.hosts.wait_to_fetch(&host, Some(self.wait)).await,
            None => Ok(true),
        }
    }

    async fn relieve(&self, item: &WorkItem) {
        PipelineStats::add(&self.stats.shed, 1);
        if self.requeue.try_send(item.clone()).is_err() {
            tracing::warn!("Requeue is full, dropping {}", item.target);
            PipelineStats::add(&self.stats.dropped, 1);
        } else {
            tracing::debug!("Shed {} back to the queue", item.target);
        }
    }

    async fn release(&self, _item: &WorkItem) {}
}

struct Shared {
    config: SchedulerConfig,
    ip_interval: Duration,
    queue: FetchQueue,
    hosts: Arc<HostCache>,
    valve: PressureValve<WorkItem, HostGate>,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn OutputSink>,
    persistence: Option<Arc<dyn Persistence>>,
    slots: Arc<Semaphore>,
    slot_limit: AtomicUsize,
    running: AtomicBool,
    fatal: Mutex<Option<CrawlError>>,
    visited: Mutex<Option<mpsc::Sender<String>>>,
    requeue: Mutex<Option<mpsc::Receiver<WorkItem>>>,
    stats: Arc<PipelineStats>,
}

/// Third pipeline stage; cheap to clone
#[derive(Clone)]
pub struct FetchOrchestrator {
    shared: Arc<Shared>,
}

impl FetchOrchestrator {
    pub fn new(
        config: &Config,
        hosts: Arc<HostCache>,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn OutputSink>,
        persistence: Option<Arc<dyn Persistence>>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let scheduler = config.scheduler.clone();
        let (requeue_tx, requeue_rx) = mpsc::channel(scheduler.channel_capacity.max(1));
        let gate = HostGate {
            hosts: hosts.clone(),
            wait: scheduler.valve_wait(),
            requeue: requeue_tx,
            stats: stats.clone(),
        };
        let slot_limit = scheduler.max_concurrent_fetches.max(1);

        Self {
            shared: Arc::new(Shared {
                ip_interval: config.hosts.min_interval(),
                queue: FetchQueue::new(scheduler.queue_grace()),
                hosts,
                valve: PressureValve::new(gate, scheduler.pressure_threshold),
                fetcher,
                sink,
                persistence,
                slots: Arc::new(Semaphore::new(slot_limit)),
                slot_limit: AtomicUsize::new(slot_limit),
                running: AtomicBool::new(true),
                fatal: Mutex::new(None),
                visited: Mutex::new(None),
                requeue: Mutex::new(Some(requeue_rx)),
                stats,
                config: scheduler,
            }),
        }
    }

    /// Consumes accepted batches until `inbound` closes and every worker is done
    ///
    /// Returns the fatal error that stopped the run, if any.
    pub async fn run(&self, mut inbound: mpsc::Receiver<Vec<WorkItem>>) -> Result<()> {
        let mut requeue = self
            .shared
            .requeue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(CrawlError::Disposed {
                what: "fetch orchestrator",
            })?;
        let recorder = self.start_recorder();

        let mut workers = JoinSet::new();
        let mut inbound_open = true;
        tracing::info!(
            "Fetch orchestrator started with {} slots",
            self.shared.slot_limit.load(Ordering::Acquire)
        );

        while self.shared.is_running() {
            if !inbound_open && workers.is_empty() {
                break;
            }

            tokio::select! {
                batch = inbound.recv(), if inbound_open => match batch {
                    Some(batch) => self.dispatch(batch, &mut workers).await,
                    None => {
                        tracing::debug!("Orchestrator input closed, draining workers");
                        inbound_open = false;
                    }
                },
                Some(item) = requeue.recv() => self.dispatch(vec![item], &mut workers).await,
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!("Fetch worker failed: {}", e);
                    }
                }
                else => break,
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Fetch worker failed: {}", e);
            }
        }

        let mut leftover = 0;
        while requeue.try_recv().is_ok() {
            leftover += 1;
        }
        PipelineStats::add(&self.shared.stats.dropped, leftover);

        self.shared
            .visited
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(recorder) = recorder {
            recorder.await?;
        }

        tracing::info!("Fetch orchestrator stopped");
        match self.shared.take_fatal() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Applies new concurrency and pressure limits to running workers
    ///
    /// Lowering the slot count takes effect as running workers finish.
    pub fn apply(&self, settings: &LiveSettings) {
        let limit = settings.max_concurrent_fetches.max(1);
        let previous = self.shared.slot_limit.swap(limit, Ordering::AcqRel);

        if limit > previous {
            self.shared.slots.add_permits(limit - previous);
        } else if limit < previous {
            let slots = self.shared.slots.clone();
            let surplus = u32::try_from(previous - limit).unwrap_or(u32::MAX);
            tokio::spawn(async move {
                if let Ok(permits) = slots.acquire_many_owned(surplus).await {
                    permits.forget();
                }
            });
        }

        self.shared.valve.set_threshold(settings.pressure_threshold);
        tracing::info!(
            "Applied live settings: {} slots, pressure threshold {}",
            limit,
            settings.pressure_threshold
        );
    }

    /// Stops workers at their next item boundary
    pub fn shutdown(&self) {
        tracing::info!("Fetch orchestrator shutting down");
        self.shared.stop();
    }

    /// Worker slots not currently taken
    pub fn available_slots(&self) -> usize {
        self.shared.slots.available_permits()
    }

    /// Current pressure threshold
    pub fn pressure_threshold(&self) -> usize {
        self.shared.valve.threshold()
    }

    fn start_recorder(&self) -> Option<JoinHandle<()>> {
        let persistence = self.shared.persistence.clone()?;
        let ttl = chrono::Duration::from_std(self.shared.config.visited_ttl())
            .unwrap_or_else(|_| chrono::Duration::days(7));
        let (tx, mut rx) = mpsc::channel::<String>(self.shared.config.channel_capacity.max(1));

        *self
            .shared
            .visited
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tx);

        Some(tokio::spawn(async move {
            while let Some(uri) = rx.recv().await {
                if let Err(e) = persistence.save_visited(&uri, Utc::now() + ttl).await {
                    tracing::warn!("Failed to record visit to {}: {}", uri, e);
                }
            }
        }))
    }

    async fn dispatch(&self, batch: Vec<WorkItem>, workers: &mut JoinSet<()>) {
        let mut groups: Vec<(IpAddr, Vec<WorkItem>)> = Vec::new();
        for item in batch {
            let Some(ip) = item.ip else {
                tracing::debug!("Dropping {} without a resolved IP", item.target);
                PipelineStats::add(&self.shared.stats.dropped, 1);
                continue;
            };
            match groups.iter_mut().find(|(group_ip, _)| *group_ip == ip) {
                Some((_, items)) => items.push(item),
                None => groups.push((ip, vec![item])),
            }
        }

        for (ip, items) in groups {
            let count = items.len() as u64;
            let enqueued = match self.shared.queue.enqueue(items).await {
                Ok(enqueued) => enqueued,
                Err(e) => {
                    tracing::warn!("Could not queue {} items for {}: {}", count, ip, e);
                    PipelineStats::add(&self.shared.stats.dropped, count);
                    continue;
                }
            };
            if !enqueued.created {
                continue;
            }

            let slot = match self.shared.slots.clone().acquire_owned().await {
                Ok(slot) => slot,
                Err(_) => {
                    let dropped = self.shared.queue.remove_queue(ip).await;
                    PipelineStats::add(&self.shared.stats.dropped, dropped.len() as u64);
                    continue;
                }
            };

            tracing::debug!("Starting worker for {}", ip);
            workers.spawn(work(self.shared.clone(), ip, enqueued.queue_id, slot));
        }
    }
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.slots.close();
        self.valve.dispose();
    }

    fn fail(&self, error: CrawlError) {
        tracing::error!("Fatal: {}", error);
        let mut fatal = self.fatal.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if fatal.is_none() {
            *fatal = Some(error);
        }
        drop(fatal);
        self.stop();
    }

    fn take_fatal(&self) -> Option<CrawlError> {
        self.fatal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    async fn mark_visited(&self, item: &WorkItem) {
        let visited = self
            .visited
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(visited) = visited {
            if visited.send(item.target.to_string()).await.is_err() {
                tracing::debug!("Visit recorder is gone");
            }
        }
    }

    async fn fetch(&self, item: &mut WorkItem) -> FetchOutcome {
        item.advance(FetchStatus::Fetching);
        self.mark_visited(item).await;

        let outcome =
            match tokio::time::timeout(self.config.fetch_timeout(), self.fetcher.fetch(item)).await {
                Ok(outcome) => outcome,
                Err(_) => FetchOutcome::NetworkError {
                    error: "Fetch timed out".to_string(),
                },
            };

        item.advance(FetchStatus::Fetched);
        if outcome.is_success() {
            PipelineStats::add(&self.stats.fetched, 1);
        } else {
            PipelineStats::add(&self.stats.failed, 1);
        }
        tracing::trace!("Fetched {}: {}", item.target, outcome);
        outcome
    }

    /// True if the host crossed the network-issue threshold
    async fn note_network_issue(&self, item: &WorkItem) -> bool {
        let Some(host) = item.host() else {
            return false;
        };
        match self.hosts.record_network_issue(&host).await {
            Ok(issues) => issues >= self.config.max_network_issues,
            Err(e) => {
                tracing::debug!("Could not count network issue for {}: {}", host, e);
                false
            }
        }
    }
}

async fn work(shared: Arc<Shared>, ip: IpAddr, queue_id: u64, _slot: OwnedSemaphorePermit) {
    let mut last_start: Option<Instant> = None;
    let mut queue_gone = false;

    while shared.is_running() {
        let mut item = match shared.queue.dequeue(ip, queue_id).await {
            Dequeued::Item(item) => item,
            Dequeued::Empty => {
                tokio::time::sleep(shared.config.idle_poll()).await;
                continue;
            }
            Dequeued::Gone => {
                queue_gone = true;
                break;
            }
        };

        if let Some(previous) = last_start {
            tokio::time::sleep_until(previous + shared.ip_interval).await;
        }

        match shared.valve.wait_to_enter(&item).await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                tracing::debug!("Worker for {} stopping: {}", ip, e);
                PipelineStats::add(&shared.stats.dropped, 1);
                break;
            }
        }

        last_start = Some(Instant::now());
        let outcome = shared.fetch(&mut item).await;
        if let Err(e) = shared.valve.exit(&item).await {
            tracing::trace!("Valve exit after shutdown: {}", e);
        }

        if let Err(e) = shared.sink.record(&item, &outcome).await {
            shared.fail(e);
            break;
        }

        if outcome.is_network_issue() && shared.note_network_issue(&item).await {
            let abandoned = shared.queue.remove_queue(ip).await;
            tracing::warn!(
                "Too many network issues for {}, dropping {} queued items",
                item.host().unwrap_or_default(),
                abandoned.len()
            );
            PipelineStats::add(&shared.stats.dropped, abandoned.len() as u64);
            queue_gone = true;
            break;
        }
    }

    if !queue_gone {
        let abandoned = shared.queue.remove_queue(ip).await;
        PipelineStats::add(&shared.stats.dropped, abandoned.len() as u64);
    }
    tracing::trace!("Worker for {} finished", ip);
}
