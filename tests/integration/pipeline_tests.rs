//! Integration tests for the scheduling pipeline
//!
//! These tests drive the whole pipeline (intake, validation, orchestrator)
//! with in-memory collaborators so no network access is needed.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use crawlgate::config::{Config, LiveSettings};
use crawlgate::crawler::{FetchOutcome, Fetcher, MemorySink, OutputSink, StaticResolver};
use crawlgate::pipeline::{Collaborators, DefaultPriorityModel, Pipeline};
use crawlgate::robots::RobotsSource;
use crawlgate::storage::{MemoryStore, Persistence};
use crawlgate::{CrawlError, FetchStatus, WorkItem};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

const ROBOTS: &str = "user-agent: *\n\ndisallow: /data/*\ndisallow: /daylight/$\ndisallow: /jerk\ndisallow: /h*ray.html$";

/// Serves robots.txt text from a fixed table
#[derive(Default)]
struct TableRobots {
    bodies: HashMap<String, String>,
}

impl TableRobots {
    fn with(mut self, host: &str, body: &str) -> Self {
        self.bodies.insert(host.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl RobotsSource for TableRobots {
    async fn fetch(&self, host: &str) -> crawlgate::Result<Option<String>> {
        Ok(self.bodies.get(host).cloned())
    }
}

/// Answers every fetch with 200 and remembers what was asked for
#[derive(Default)]
struct OkFetcher {
    fetched: Mutex<Vec<String>>,
}

impl OkFetcher {
    fn fetched(&self) -> Vec<String> {
        let mut fetched = self.fetched.lock().unwrap().clone();
        fetched.sort();
        fetched
    }
}

#[async_trait]
impl Fetcher for OkFetcher {
    async fn fetch(&self, item: &WorkItem) -> FetchOutcome {
        self.fetched.lock().unwrap().push(item.target.to_string());
        FetchOutcome::Fetched {
            status_code: 200,
            content_type: Some("text/html".to_string()),
            bytes: 512,
        }
    }
}

struct FullDiskSink;

#[async_trait]
impl OutputSink for FullDiskSink {
    async fn record(&self, item: &WorkItem, _outcome: &FetchOutcome) -> crawlgate::Result<()> {
        Err(CrawlError::FatalOutput {
            url: item.target.to_string(),
            message: "No space left on device".to_string(),
        })
    }
}

/// Takes every record, but the final flush fails
struct LateFailureSink;

#[async_trait]
impl OutputSink for LateFailureSink {
    async fn record(&self, _item: &WorkItem, _outcome: &FetchOutcome) -> crawlgate::Result<()> {
        Ok(())
    }

    async fn flush(&self) -> crawlgate::Result<()> {
        Err(CrawlError::FatalOutput {
            url: "buffered results".to_string(),
            message: "No space left on device".to_string(),
        })
    }
}

struct Harness {
    pipeline: Pipeline,
    fetcher: Arc<OkFetcher>,
    sink: Arc<MemorySink>,
    store: Arc<MemoryStore>,
}

/// Creates a test configuration with short timings
fn create_test_config() -> Config {
    let mut config = Config::default();
    config.hosts.min_interval_ms = 100;
    config.scheduler.queue_grace_ms = 200;
    config.scheduler.idle_poll_ms = 50;
    config
}

fn create_resolver() -> StaticResolver {
    StaticResolver::new()
        .with("example.org", "192.0.2.10".parse().unwrap())
        .with("other.org", "192.0.2.20".parse().unwrap())
}

fn start(config: &Config, robots: TableRobots, store: Arc<MemoryStore>) -> Harness {
    let fetcher = Arc::new(OkFetcher::default());
    let sink = Arc::new(MemorySink::new());
    let persistence: Arc<dyn Persistence> = store.clone();

    let pipeline = Pipeline::start(
        config,
        Collaborators {
            resolver: Arc::new(create_resolver()),
            fetcher: fetcher.clone(),
            robots: Arc::new(robots),
            persistence: Some(persistence),
            sink: sink.clone(),
            priority: Arc::new(DefaultPriorityModel::default()),
        },
    );

    Harness {
        pipeline,
        fetcher,
        sink,
        store,
    }
}

fn link(target: &str) -> WorkItem {
    WorkItem::new(Url::parse(target).unwrap(), None)
}

#[tokio::test(start_paused = true)]
async fn test_robots_rules_decide_what_is_fetched() {
    let harness = start(
        &create_test_config(),
        TableRobots::default().with("example.org", ROBOTS),
        Arc::new(MemoryStore::new()),
    );

    harness
        .pipeline
        .submit(link("http://example.org/jerk"))
        .await
        .unwrap();
    harness
        .pipeline
        .submit(link("http://example.org/index.html"))
        .await
        .unwrap();

    let stats = harness.pipeline.finish().await.unwrap();

    assert_eq!(harness.fetcher.fetched(), vec!["http://example.org/index.html"]);
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.fetched, 1);

    let records = harness.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0.status, FetchStatus::Fetched);
    assert!(records[0].1.is_success());

    assert_eq!(harness.store.visited(), vec!["http://example.org/index.html"]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicates_and_fresh_visits_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    store
        .save_visited("http://other.org/seen", Utc::now() + ChronoDuration::hours(1))
        .await
        .unwrap();
    let harness = start(&create_test_config(), TableRobots::default(), store);

    let page = Url::parse("http://example.org/dir/").unwrap();
    for target in ["a", "a#top", "./a", "http://other.org/seen", "http://other.org/new"] {
        harness.pipeline.submit_link(Some(&page), target).await.unwrap();
    }

    let stats = harness.pipeline.finish().await.unwrap();

    assert_eq!(
        harness.fetcher.fetched(),
        vec!["http://example.org/dir/a", "http://other.org/new"]
    );
    assert_eq!(stats.submitted, 5);
    assert_eq!(stats.duplicates, 2);
    assert_eq!(stats.fresh, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_and_blocked_hosts_are_not_fetched() {
    let store = Arc::new(MemoryStore::new());
    store.block_host("other.org");
    let mut config = create_test_config();
    config.intake.blocked_domains = vec!["*.ads.example".to_string()];
    let harness = start(&config, TableRobots::default(), store);

    for target in [
        "http://nowhere.invalid/",
        "http://tracker.ads.example/pixel",
        "http://other.org/page",
        "http://example.org/photo.jpg",
        "http://example.org/page",
    ] {
        harness.pipeline.submit(link(target)).await.unwrap();
    }

    let stats = harness.pipeline.finish().await.unwrap();

    assert_eq!(harness.fetcher.fetched(), vec!["http://example.org/page"]);
    assert_eq!(stats.rejected, 4);
}

#[tokio::test(start_paused = true)]
async fn test_output_failure_stops_the_run() {
    let pipeline = Pipeline::start(
        &create_test_config(),
        Collaborators {
            resolver: Arc::new(create_resolver()),
            fetcher: Arc::new(OkFetcher::default()),
            robots: Arc::new(TableRobots::default()),
            persistence: None,
            sink: Arc::new(FullDiskSink),
            priority: Arc::new(DefaultPriorityModel::default()),
        },
    );

    pipeline.submit(link("http://example.org/1")).await.unwrap();
    pipeline.submit(link("http://example.org/2")).await.unwrap();

    let err = pipeline.finish().await.unwrap_err();
    assert!(matches!(err, CrawlError::FatalOutput { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_final_flush_is_fatal() {
    let pipeline = Pipeline::start(
        &create_test_config(),
        Collaborators {
            resolver: Arc::new(create_resolver()),
            fetcher: Arc::new(OkFetcher::default()),
            robots: Arc::new(TableRobots::default()),
            persistence: None,
            sink: Arc::new(LateFailureSink),
            priority: Arc::new(DefaultPriorityModel::default()),
        },
    );

    pipeline.submit(link("http://example.org/1")).await.unwrap();

    let err = pipeline.finish().await.unwrap_err();
    assert!(matches!(err, CrawlError::FatalOutput { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_live_settings_apply_while_running() {
    let harness = start(
        &create_test_config(),
        TableRobots::default(),
        Arc::new(MemoryStore::new()),
    );

    harness.pipeline.apply(&LiveSettings {
        max_concurrent_fetches: 1,
        pressure_threshold: 2,
    });

    for n in 0..3 {
        harness
            .pipeline
            .submit(link(&format!("http://example.org/{}", n)))
            .await
            .unwrap();
        harness
            .pipeline
            .submit(link(&format!("http://other.org/{}", n)))
            .await
            .unwrap();
    }

    let stats = harness.pipeline.finish().await.unwrap();
    assert_eq!(stats.fetched, 6);
    assert_eq!(harness.fetcher.fetched().len(), 6);
}
