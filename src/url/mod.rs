//! URL handling module for crawlgate
//!
//! This module provides URL normalization, host extraction, wildcard domain
//! matching, and the cheap heuristics intake uses to flag links before doing
//! any expensive work.

mod domain;
mod matcher;
mod normalize;

use crate::config::IntakeConfig;
use ::url::Url;

// Re-export main functions
pub use domain::{extract_domain, top_level_domain};
pub use matcher::{matches_any, matches_wildcard};
pub use normalize::{normalize_url, resolve_link};

/// Cheap, allocation-light checks applied to every enriched link
///
/// All lists are compared case-insensitively.
#[derive(Debug, Clone)]
pub struct UrlScreen {
    supported_schemes: Vec<String>,
    blocked_extensions: Vec<String>,
    blocked_tlds: Vec<String>,
    blocked_domains: Vec<String>,
}

impl UrlScreen {
    /// Builds a screen from the intake configuration
    pub fn from_config(config: &IntakeConfig) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        Self {
            supported_schemes: lower(&config.supported_schemes),
            blocked_extensions: lower(&config.blocked_extensions),
            blocked_tlds: lower(&config.blocked_tlds),
            blocked_domains: config.blocked_domains.clone(),
        }
    }

    /// True if no fetcher can handle the URL's scheme
    pub fn unsupported_scheme(&self, url: &Url) -> bool {
        !self
            .supported_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(url.scheme()))
    }

    /// True if the path ends in a known binary extension or the host sits
    /// under a disallowed top-level domain
    pub fn probably_blocked(&self, url: &Url) -> bool {
        let extension = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|last| last.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        if let Some(ext) = extension {
            if self.blocked_extensions.iter().any(|e| *e == ext) {
                return true;
            }
        }

        extract_domain(url)
            .as_deref()
            .and_then(top_level_domain)
            .is_some_and(|tld| self.blocked_tlds.iter().any(|t| t == tld))
    }

    /// True if the host is on the blocked domain list
    pub fn domain_blocked(&self, host: &str) -> bool {
        matches_any(&self.blocked_domains, host)
    }
}
