//! Per-host politeness state

use crate::robots::CachedRobots;
use crate::{CrawlError, Result};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Calls {
    last_call: Option<Instant>,
    touches: u64,
}

/// State for one host: when it was last called, how often it failed, and its robots rules
///
/// Two gates serialize the expensive paths: one for downloading robots.txt and
/// one for deciding whether a fetch may start. Closing the record closes both,
/// after which every gated call returns [`CrawlError::Disposed`].
#[derive(Debug)]
pub struct HostRecord {
    host: String,
    calls: Mutex<Calls>,
    min_interval_ms: AtomicU64,
    network_issues: AtomicU32,
    robots_gate: Semaphore,
    fetch_gate: Semaphore,
    robots: Mutex<Option<CachedRobots>>,
    blocked: AtomicBool,
    closed: AtomicBool,
}

impl HostRecord {
    pub fn new(host: &str, min_interval: Duration) -> Self {
        Self {
            host: host.to_string(),
            calls: Mutex::new(Calls::default()),
            min_interval_ms: AtomicU64::new(saturating_millis(min_interval)),
            network_issues: AtomicU32::new(0),
            robots_gate: Semaphore::new(1),
            fetch_gate: Semaphore::new(1),
            robots: Mutex::new(None),
            blocked: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_min_interval(&self, interval: Duration) {
        self.min_interval_ms
            .store(saturating_millis(interval), Ordering::Relaxed);
    }

    /// Number of granted fetches
    pub fn touches(&self) -> u64 {
        self.lock_calls().touches
    }

    /// When the last fetch was granted
    pub fn last_call(&self) -> Option<Instant> {
        self.lock_calls().last_call
    }

    /// Waits until the minimum interval since the last granted call has passed
    ///
    /// Returns `Ok(true)` once the call is granted and stamped, or `Ok(false)`
    /// if `timeout` runs out first. `None` waits as long as it takes. Between
    /// attempts the caller sleeps a random duration in
    /// `[interval / 2, interval * 2]` so waiters do not wake in lockstep.
    pub async fn wait_to_fetch(&self, timeout: Option<Duration>) -> Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            {
                let _gate = self.fetch_gate.acquire().await.map_err(|_| self.disposed())?;
                let now = Instant::now();
                let interval = self.min_interval();
                let mut calls = self.lock_calls();
                let ready = calls
                    .last_call
                    .map_or(true, |last| now.duration_since(last) >= interval);

                if ready {
                    calls.last_call = Some(now);
                    calls.touches += 1;
                    return Ok(true);
                }
            }

            let mut pause = jitter(self.min_interval());
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                pause = pause.min(deadline - now);
            }

            tokio::time::sleep(pause).await;
        }
    }

    /// Takes the robots gate; only one caller downloads robots.txt at a time
    pub async fn lock_robots(&self) -> Result<SemaphorePermit<'_>> {
        self.robots_gate.acquire().await.map_err(|_| self.disposed())
    }

    /// The cached robots entry, if one exists and has not expired
    pub fn fresh_robots(&self) -> Option<CachedRobots> {
        self.lock_robots_slot()
            .as_ref()
            .filter(|cached| !cached.is_stale())
            .cloned()
    }

    pub fn set_robots(&self, robots: CachedRobots) {
        *self.lock_robots_slot() = Some(robots);
    }

    pub fn record_network_issue(&self) -> u32 {
        self.network_issues.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn network_issues(&self) -> u32 {
        self.network_issues.load(Ordering::Relaxed)
    }

    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::Relaxed);
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Relaxed)
    }

    /// Closes both gates and drops the ruleset
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.robots_gate.close();
        self.fetch_gate.close();
        self.lock_robots_slot().take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn disposed(&self) -> CrawlError {
        CrawlError::Disposed {
            what: "host record",
        }
    }

    fn lock_calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_robots_slot(&self) -> MutexGuard<'_, Option<CachedRobots>> {
        self.robots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn jitter(interval: Duration) -> Duration {
    if interval.is_zero() {
        return Duration::from_millis(1);
    }
    rand::thread_rng().gen_range(interval / 2..=interval.saturating_mul(2))
}

fn saturating_millis(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robots::RobotsRuleset;
    use std::sync::Arc;

    #[test]
    fn test_huge_intervals_saturate() {
        let record = HostRecord::new("example.org", Duration::MAX);
        assert_eq!(record.min_interval(), Duration::from_millis(u64::MAX));

        record.set_min_interval(Duration::from_secs(u64::MAX));
        assert_eq!(record.min_interval(), Duration::from_millis(u64::MAX));

        let pause = jitter(Duration::MAX);
        assert!(pause >= Duration::MAX / 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grants_are_spaced_by_min_interval() {
        let interval = Duration::from_millis(100);
        let record = HostRecord::new("example.org", interval);

        let mut grants = Vec::new();
        for _ in 0..5 {
            assert!(record.wait_to_fetch(None).await.unwrap());
            grants.push(Instant::now());
        }

        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
        assert_eq!(record.touches(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_grants_are_spaced() {
        let interval = Duration::from_millis(250);
        let record = Arc::new(HostRecord::new("example.org", interval));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let record = record.clone();
            handles.push(tokio::spawn(async move {
                record.wait_to_fetch(None).await.unwrap();
                Instant::now()
            }));
        }

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        grants.sort();

        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_false() {
        let record = HostRecord::new("example.org", Duration::from_secs(10));
        assert!(record.wait_to_fetch(None).await.unwrap());

        let started = Instant::now();
        let granted = record
            .wait_to_fetch(Some(Duration::from_millis(50)))
            .await
            .unwrap();

        assert!(!granted);
        assert!(Instant::now() - started < Duration::from_secs(1));
        assert_eq!(record.touches(), 1);
    }

    #[tokio::test]
    async fn test_closed_record_is_disposed() {
        let record = HostRecord::new("example.org", Duration::from_millis(10));
        record.set_robots(CachedRobots::new(
            Some(RobotsRuleset::parse("User-agent: *\nDisallow: /")),
            Duration::from_secs(3600),
        ));
        record.close();

        assert!(record.is_closed());
        assert!(record.fresh_robots().is_none());
        assert!(matches!(
            record.wait_to_fetch(None).await,
            Err(CrawlError::Disposed { .. })
        ));
        assert!(record.lock_robots().await.is_err());
    }

    #[test]
    fn test_network_issue_counter() {
        let record = HostRecord::new("example.org", Duration::ZERO);
        assert_eq!(record.record_network_issue(), 1);
        assert_eq!(record.record_network_issue(), 2);
        assert_eq!(record.network_issues(), 2);
    }
}
