//! The crawl scheduling pipeline
//!
//! Three stages connected by bounded channels:
//!
//! 1. [`LinkIntake`] dedups and enriches links and batches them per target IP
//! 2. [`Validator`] rejects what should not be fetched
//! 3. [`FetchOrchestrator`] runs one polite worker per target IP
//!
//! [`Pipeline`] wires the stages together, owns the shared host cache, and
//! shuts everything down in order.

mod intake;
mod orchestrator;
mod priority;
mod stats;
mod validation;

pub use intake::LinkIntake;
pub use orchestrator::FetchOrchestrator;
pub use priority::{DefaultPriorityModel, PriorityModel, REVISIT_PENALTY, SAME_HOST_PENALTY};
pub use stats::{print_summary, PipelineStats, StatsSnapshot};
pub use validation::{Rejection, Validator, Verdict};

use crate::config::{Config, LiveSettings};
use crate::crawler::{Fetcher, OutputSink, Resolver};
use crate::host::HostCache;
use crate::robots::RobotsSource;
use crate::state::WorkItem;
use crate::storage::Persistence;
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// External pieces the pipeline delegates to
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn Resolver>,
    pub fetcher: Arc<dyn Fetcher>,
    pub robots: Arc<dyn RobotsSource>,
    pub persistence: Option<Arc<dyn Persistence>>,
    pub sink: Arc<dyn OutputSink>,
    pub priority: Arc<dyn PriorityModel>,
}

/// A running pipeline
pub struct Pipeline {
    intake: Arc<LinkIntake>,
    orchestrator: FetchOrchestrator,
    hosts: Arc<HostCache>,
    sink: Arc<dyn OutputSink>,
    stats: Arc<PipelineStats>,
    validator_task: JoinHandle<Result<()>>,
    rejected_task: JoinHandle<()>,
    orchestrator_task: JoinHandle<Result<()>>,
}

impl Pipeline {
    /// Builds every stage and starts the background tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            resolver,
            fetcher,
            robots,
            persistence,
            sink,
            priority,
        } = collaborators;
        let capacity = config.scheduler.channel_capacity.max(1);
        let stats = Arc::new(PipelineStats::new());

        let mut hosts = HostCache::new(&config.hosts, config.user_agent.robots_token(), robots);
        if let Some(persistence) = &persistence {
            hosts = hosts.with_persistence(persistence.clone());
        }
        let hosts = Arc::new(hosts);

        let (intake_tx, intake_rx) = mpsc::channel(capacity);
        let (accepted_tx, accepted_rx) = mpsc::channel(capacity);
        let (rejected_tx, rejected_rx) = mpsc::channel(capacity);

        let intake = Arc::new(LinkIntake::new(
            &config.intake,
            resolver,
            persistence.clone(),
            priority,
            intake_tx,
            stats.clone(),
        ));

        let validator = Validator::new(&config.validation, hosts.clone(), stats.clone());
        let validator_task =
            tokio::spawn(async move { validator.run(intake_rx, accepted_tx, rejected_tx).await });
        let rejected_task = tokio::spawn(log_rejections(rejected_rx));

        let orchestrator = FetchOrchestrator::new(
            config,
            hosts.clone(),
            fetcher,
            sink.clone(),
            persistence,
            stats.clone(),
        );
        let orchestrator_task = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(accepted_rx).await })
        };

        tracing::info!("Pipeline started");
        Self {
            intake,
            orchestrator,
            hosts,
            sink,
            stats,
            validator_task,
            rejected_task,
            orchestrator_task,
        }
    }

    /// Submits a work item; see [`LinkIntake::submit`]
    pub async fn submit(&self, item: WorkItem) -> Result<bool> {
        self.intake.submit(item).await
    }

    /// Submits a raw link found on `source`; see [`LinkIntake::submit_link`]
    pub async fn submit_link(&self, source: Option<&Url>, link: &str) -> Result<bool> {
        self.intake.submit_link(source, link).await
    }

    /// Applies live settings without restarting anything
    pub fn apply(&self, settings: &LiveSettings) {
        self.orchestrator.apply(settings);
    }

    /// Stops fetch workers at their next item boundary
    pub fn shutdown(&self) {
        self.orchestrator.shutdown();
    }

    /// Current counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The host cache shared by validation and fetching
    pub fn hosts(&self) -> &Arc<HostCache> {
        &self.hosts
    }

    /// Closes intake and waits for every queued item to be fetched or dropped
    ///
    /// A fatal output error from the orchestrator takes precedence over any
    /// other failure.
    pub async fn finish(self) -> Result<StatsSnapshot> {
        let closed = self.intake.close().await;
        drop(self.intake);

        let validated = self.validator_task.await?;
        self.rejected_task.await?;
        let orchestrated = self.orchestrator_task.await?;

        self.hosts.close_all().await;
        let flushed = self.sink.flush().await;

        let snapshot = self.stats.snapshot();
        tracing::info!("Pipeline finished: {}", snapshot);

        orchestrated?;
        validated?;
        closed?;
        flushed?;
        Ok(snapshot)
    }
}

async fn log_rejections(mut rejected: mpsc::Receiver<Vec<WorkItem>>) {
    while let Some(batch) = rejected.recv().await {
        for item in batch {
            tracing::debug!("Rejected {}", item.to_line());
        }
    }
}
