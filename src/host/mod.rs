//! Host cache
//!
//! One [`HostRecord`] per host, kept in a bounded LRU index. Referencing a host
//! moves it to the most-recently-used end; admitting a host past the limit
//! evicts and closes the least recently used record. Robots.txt is loaded lazily
//! per host, at most once per TTL window, with concurrent callers waiting on
//! the record's robots gate instead of downloading it twice.

mod record;

pub use record::HostRecord;

use crate::config::HostsConfig;
use crate::robots::{CachedRobots, RobotsRuleset, RobotsSource};
use crate::storage::{Persistence, StoredHost};
use crate::{CrawlError, Result};
use chrono::Utc;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Bounded, shared index of host records
pub struct HostCache {
    records: Mutex<LruCache<String, Arc<HostRecord>>>,
    source: Arc<dyn RobotsSource>,
    persistence: Option<Arc<dyn Persistence>>,
    robots_agent: String,
    min_interval: Duration,
    robots_ttl: Duration,
    closed: AtomicBool,
}

impl HostCache {
    /// Creates a cache that downloads robots.txt through `source`
    pub fn new(config: &HostsConfig, robots_agent: &str, source: Arc<dyn RobotsSource>) -> Self {
        let capacity = NonZeroUsize::new(config.max_hosts).unwrap_or(NonZeroUsize::MIN);
        Self {
            records: Mutex::new(LruCache::new(capacity)),
            source,
            persistence: None,
            robots_agent: robots_agent.to_string(),
            min_interval: config.min_interval(),
            robots_ttl: config.robots_ttl(),
            closed: AtomicBool::new(false),
        }
    }

    /// Fills robots.txt and blocked flags from storage before downloading
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Agent token robots rules are evaluated for
    pub fn robots_agent(&self) -> &str {
        &self.robots_agent
    }

    /// Returns the record for `host`, creating it (and possibly evicting another) if needed
    pub async fn record(&self, host: &str) -> Result<Arc<HostRecord>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CrawlError::Disposed { what: "host cache" });
        }

        let key = host.to_ascii_lowercase();
        let mut records = self.records.lock().await;
        if let Some(record) = records.get(&key) {
            return Ok(record.clone());
        }

        let record = Arc::new(HostRecord::new(&key, self.min_interval));
        if let Some((evicted_host, evicted)) = records.push(key, record.clone()) {
            tracing::trace!("Evicting host record for {}", evicted_host);
            evicted.close();
        }

        Ok(record)
    }

    /// Robots rules for `host`, loading them if missing or expired
    ///
    /// Download failures are logged and yield `None`, which blocks nothing.
    pub async fn robots(&self, host: &str) -> Result<Option<Arc<RobotsRuleset>>> {
        let record = self.record(host).await?;
        if let Some(cached) = record.fresh_robots() {
            return Ok(cached.ruleset);
        }

        let _gate = record.lock_robots().await?;
        // Another caller may have finished loading while we waited for the gate
        if let Some(cached) = record.fresh_robots() {
            return Ok(cached.ruleset);
        }

        let cached = self.load_robots(&record).await;
        self.apply_crawl_delay(&record, &cached);
        let ruleset = cached.ruleset.clone();
        record.set_robots(cached);

        Ok(ruleset)
    }

    /// True if `url` is disallowed for this crawler on its host
    pub async fn disallowed(&self, host: &str, url: &url::Url) -> Result<bool> {
        Ok(self
            .robots(host)
            .await?
            .is_some_and(|robots| robots.disallowed(url, &self.robots_agent)))
    }

    /// True if storage marked the host as blocked (known once its robots were loaded)
    pub async fn is_blocked(&self, host: &str) -> Result<bool> {
        Ok(self.record(host).await?.is_blocked())
    }

    /// Waits for permission to fetch from `host`; see [`HostRecord::wait_to_fetch`]
    pub async fn wait_to_fetch(&self, host: &str, timeout: Option<Duration>) -> Result<bool> {
        let record = self.record(host).await?;
        record.wait_to_fetch(timeout).await
    }

    /// Counts a network failure against `host`; returns the new total
    pub async fn record_network_issue(&self, host: &str) -> Result<u32> {
        Ok(self.record(host).await?.record_network_issue())
    }

    pub async fn network_issues(&self, host: &str) -> Result<u32> {
        Ok(self.record(host).await?.network_issues())
    }

    /// Number of records currently held
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Closes every record; later calls fail with [`CrawlError::Disposed`]
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        let mut records = self.records.lock().await;
        for (_, record) in records.iter() {
            record.close();
        }
        records.clear();
    }

    async fn load_robots(&self, record: &HostRecord) -> CachedRobots {
        let host = record.host();

        let stored = match &self.persistence {
            Some(persistence) => match persistence.get_host_record(host).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!("Failed to load stored record for {}: {}", host, e);
                    None
                }
            },
            None => None,
        };

        if let Some(stored) = &stored {
            record.set_blocked(stored.is_blocked);
            if let Some(fetched_at) = stored.robots_fetched_at {
                let cached = CachedRobots::fetched_at(
                    stored.robots_txt.as_deref().map(RobotsRuleset::parse),
                    fetched_at,
                    self.robots_ttl,
                );
                if !cached.is_stale() {
                    tracing::trace!("Using stored robots.txt for {}", host);
                    return cached;
                }
            }
        }

        match self.source.fetch(host).await {
            Ok(text) => {
                tracing::debug!("Fetched robots.txt for {}", host);
                self.store_robots(host, stored, text.clone()).await;
                CachedRobots::new(text.as_deref().map(RobotsRuleset::parse), self.robots_ttl)
            }
            Err(e) => {
                tracing::warn!("Failed to fetch robots.txt for {}: {}", host, e);
                CachedRobots::new(None, self.robots_ttl)
            }
        }
    }

    async fn store_robots(&self, host: &str, stored: Option<StoredHost>, text: Option<String>) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let record = StoredHost {
            robots_fetched_at: Some(Utc::now()),
            robots_txt: text,
            ..stored.unwrap_or_default()
        };

        if let Err(e) = persistence.save_host_record(host, &record).await {
            tracing::warn!("Failed to save robots.txt for {}: {}", host, e);
        }
    }

    fn apply_crawl_delay(&self, record: &HostRecord, cached: &CachedRobots) {
        let interval = match cached.crawl_delay(&self.robots_agent) {
            Some(delay) if delay > self.min_interval => {
                tracing::debug!("{} asks for a crawl delay of {:?}", record.host(), delay);
                delay
            }
            _ => self.min_interval,
        };
        record.set_min_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    struct StubSource {
        body: Option<&'static str>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn serving(body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                body: Some(body),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                body: None,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RobotsSource for StubSource {
        async fn fetch(&self, host: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(CrawlError::Dns {
                    host: host.to_string(),
                    message: "unreachable".to_string(),
                });
            }
            Ok(self.body.map(str::to_string))
        }
    }

    fn hosts_config(max_hosts: usize) -> HostsConfig {
        HostsConfig {
            max_hosts,
            min_interval_ms: 100,
            robots_ttl_hours: 24,
        }
    }

    #[tokio::test]
    async fn test_robots_is_loaded_once() {
        let source = StubSource::serving("User-agent: *\nDisallow: /private\n");
        let cache = Arc::new(HostCache::new(&hosts_config(10), "TestBot", source.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.robots("example.org").await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        assert_eq!(source.calls(), 1);
        let url = Url::parse("https://example.org/private/a").unwrap();
        assert!(cache.disallowed("example.org", &url).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_download_fails_open() {
        let source = StubSource::failing();
        let cache = HostCache::new(&hosts_config(10), "TestBot", source.clone());
        let url = Url::parse("https://example.org/anything").unwrap();

        assert!(cache.robots("example.org").await.unwrap().is_none());
        assert!(!cache.disallowed("example.org", &url).await.unwrap());
        // The failure is remembered for the TTL window
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_eviction_closes_oldest_record() {
        let source = StubSource::serving("");
        let cache = HostCache::new(&hosts_config(2), "TestBot", source);

        let a = cache.record("a.org").await.unwrap();
        let b = cache.record("b.org").await.unwrap();
        // touching a makes b the oldest
        cache.record("a.org").await.unwrap();
        let _c = cache.record("c.org").await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert!(!a.is_closed());
        assert!(b.is_closed());
        assert!(matches!(
            b.wait_to_fetch(None).await,
            Err(CrawlError::Disposed { .. })
        ));
    }

    #[tokio::test]
    async fn test_crawl_delay_raises_interval() {
        let source = StubSource::serving("User-agent: *\nCrawl-delay: 2\n");
        let cache = HostCache::new(&hosts_config(10), "TestBot", source);

        cache.robots("slow.org").await.unwrap();
        let record = cache.record("slow.org").await.unwrap();
        assert_eq!(record.min_interval(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_stored_robots_skip_download() {
        let store = Arc::new(MemoryStore::new());
        store
            .save_host_record(
                "stored.org",
                &StoredHost {
                    is_blocked: true,
                    robots_fetched_at: Some(Utc::now()),
                    robots_txt: Some("User-agent: *\nDisallow: /\n".to_string()),
                },
            )
            .await
            .unwrap();

        let source = StubSource::serving("");
        let cache = HostCache::new(&hosts_config(10), "TestBot", source.clone())
            .with_persistence(store);
        let url = Url::parse("https://stored.org/page").unwrap();

        assert!(cache.disallowed("stored.org", &url).await.unwrap());
        assert!(cache.is_blocked("stored.org").await.unwrap());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_download_is_saved() {
        let store = Arc::new(MemoryStore::new());
        let source = StubSource::serving("User-agent: *\nDisallow: /x\n");
        let cache = HostCache::new(&hosts_config(10), "TestBot", source)
            .with_persistence(store.clone());

        cache.robots("fresh.org").await.unwrap();

        let stored = store.get_host_record("fresh.org").await.unwrap().unwrap();
        assert!(stored.robots_fetched_at.is_some());
        assert_eq!(stored.robots_txt.as_deref(), Some("User-agent: *\nDisallow: /x\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_to_fetch_by_host() {
        let cache = HostCache::new(&hosts_config(10), "TestBot", StubSource::serving(""));

        assert!(cache.wait_to_fetch("a.org", None).await.unwrap());
        assert!(!cache
            .wait_to_fetch("a.org", Some(Duration::from_millis(10)))
            .await
            .unwrap());
        // other hosts are independent
        assert!(cache
            .wait_to_fetch("b.org", Some(Duration::from_millis(10)))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_closed_cache_is_disposed() {
        let cache = HostCache::new(&hosts_config(10), "TestBot", StubSource::serving(""));
        let record = cache.record("a.org").await.unwrap();
        cache.close_all().await;

        assert!(record.is_closed());
        assert!(matches!(
            cache.record("a.org").await,
            Err(CrawlError::Disposed { .. })
        ));
    }
}
