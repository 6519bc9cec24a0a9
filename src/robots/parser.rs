//! Robots.txt parser and rule matcher
//!
//! Each user-agent group compiles its `Allow` and `Disallow` patterns into
//! character automatons, so checking a path costs one walk of its characters
//! no matter how many rules the file carries.

use crate::automaton::{compile_wildcard, Automaton};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Agent key used for the `User-agent: *` group
const WILDCARD_AGENT: &str = "*";

/// Longest crawl delay honored; larger values are clamped
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Parsed robots.txt rules for one host
///
/// Immutable once built; shared behind an `Arc` by the host cache.
#[derive(Debug, Clone, Default)]
pub struct RobotsRuleset {
    allow: HashMap<String, Automaton<char, bool>>,
    disallow: HashMap<String, Automaton<char, bool>>,
    crawl_delays: HashMap<String, Duration>,
    sitemaps: Vec<String>,
    malformed: bool,
}

impl RobotsRuleset {
    /// Parses robots.txt text
    ///
    /// Never fails. Lines that cannot be understood set the malformed flag and
    /// are otherwise skipped, so a file with no recognizable rules blocks
    /// nothing.
    pub fn parse(content: &str) -> Self {
        let mut ruleset = Self::default();

        // Consecutive User-agent lines share the rules that follow them
        let mut group: Vec<String> = Vec::new();
        let mut group_has_rules = false;

        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            // Trailing comments are allowed after a directive
            let trimmed = match trimmed.split_once('#') {
                Some((directive, _)) => directive.trim_end(),
                None => trimmed,
            };

            let Some((key, value)) = trimmed.split_once(':') else {
                ruleset.malformed = true;
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if group_has_rules {
                        group.clear();
                        group_has_rules = false;
                    }
                    let agent = value.to_ascii_lowercase();
                    ruleset.allow.entry(agent.clone()).or_default();
                    ruleset.disallow.entry(agent.clone()).or_default();
                    group.push(agent);
                }
                "disallow" | "allow" if group.is_empty() => {
                    ruleset.malformed = true;
                }
                "disallow" => {
                    group_has_rules = true;
                    for agent in &group {
                        if let Some(automaton) = ruleset.disallow.get_mut(agent) {
                            compile_wildcard(automaton, value, true);
                        }
                    }
                }
                "allow" => {
                    group_has_rules = true;
                    for agent in &group {
                        if let Some(automaton) = ruleset.allow.get_mut(agent) {
                            compile_wildcard(automaton, value, true);
                        }
                    }
                }
                "crawl-delay" => {
                    group_has_rules = true;
                    match parse_crawl_delay(value) {
                        Some(delay) => {
                            for agent in &group {
                                ruleset.crawl_delays.insert(agent.clone(), delay);
                            }
                        }
                        None => ruleset.malformed = true,
                    }
                }
                "sitemap" => {
                    if !value.is_empty() {
                        ruleset.sitemaps.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        ruleset
    }

    /// True if the URL's path is matched by a `Disallow` rule
    ///
    /// The exact agent group wins over the `*` group; the two are never merged.
    /// No group for either means nothing is disallowed.
    pub fn disallowed(&self, url: &Url, user_agent: &str) -> bool {
        Self::matches(&self.disallow, url, user_agent)
    }

    /// True if the URL's path is matched by an `Allow` rule
    pub fn allowed(&self, url: &Url, user_agent: &str) -> bool {
        Self::matches(&self.allow, url, user_agent)
    }

    /// Crawl delay requested for the agent, falling back to the `*` group
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let agent = user_agent.to_ascii_lowercase();
        self.crawl_delays
            .get(&agent)
            .or_else(|| self.crawl_delays.get(WILDCARD_AGENT))
            .copied()
    }

    /// Sitemap URLs listed anywhere in the file
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// True if any line could not be understood
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// True if the file named no user agents at all
    pub fn is_empty(&self) -> bool {
        self.disallow.is_empty()
    }

    fn matches(automatons: &HashMap<String, Automaton<char, bool>>, url: &Url, user_agent: &str) -> bool {
        let agent = user_agent.to_ascii_lowercase();
        let Some(automaton) = automatons
            .get(&agent)
            .or_else(|| automatons.get(WILDCARD_AGENT))
        else {
            return false;
        };

        let mut path: Vec<char> = url.path().chars().collect();
        if let Some(query) = url.query() {
            path.push('?');
            path.extend(query.chars());
        }

        automaton.accepts(&path, &true)
    }
}

/// Seconds, possibly fractional. Negative or non-numeric values yield `None`.
fn parse_crawl_delay(value: &str) -> Option<Duration> {
    let secs: f64 = value.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).map_or(MAX_CRAWL_DELAY, |d| d.min(MAX_CRAWL_DELAY)))
}
