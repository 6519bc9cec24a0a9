//! Robots.txt caching implementation
//!
//! This module wraps a parsed ruleset with the time it was fetched, so the
//! host cache can tell when a host's robots.txt needs to be downloaded again.

use crate::robots::RobotsRuleset;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use url::Url;

/// Cached robots.txt data for a host
///
/// A missing ruleset means the host has no usable robots.txt (or it could not
/// be fetched) and nothing is disallowed until the entry goes stale.
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed ruleset, if one was obtained
    pub ruleset: Option<Arc<RobotsRuleset>>,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    /// How long the entry stays valid
    pub ttl: Duration,
}

impl CachedRobots {
    /// Creates an entry stamped with the current time
    pub fn new(ruleset: Option<RobotsRuleset>, ttl: std::time::Duration) -> Self {
        Self::fetched_at(ruleset, Utc::now(), ttl)
    }

    /// Creates an entry with an explicit fetch time (used when filling from storage)
    pub fn fetched_at(
        ruleset: Option<RobotsRuleset>,
        fetched_at: DateTime<Utc>,
        ttl: std::time::Duration,
    ) -> Self {
        Self {
            ruleset: ruleset.map(Arc::new),
            fetched_at,
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
        }
    }

    /// Checks if the entry is older than its TTL
    pub fn is_stale(&self) -> bool {
        self.age() > self.ttl
    }

    /// Returns how long ago the robots.txt was fetched
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    /// Checks a URL against the cached Disallow rules; fails open without a ruleset
    pub fn disallowed(&self, url: &Url, user_agent: &str) -> bool {
        self.ruleset
            .as_ref()
            .is_some_and(|robots| robots.disallowed(url, user_agent))
    }

    /// Gets the crawl delay from the cached ruleset
    pub fn crawl_delay(&self, user_agent: &str) -> Option<std::time::Duration> {
        self.ruleset
            .as_ref()
            .and_then(|robots| robots.crawl_delay(user_agent))
    }
}
