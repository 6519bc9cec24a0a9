//! crawlgate: crawl scheduling and host rate limiting
//!
//! This crate takes a stream of discovered links and turns it into polite,
//! bounded fetch traffic. Links are deduplicated and enriched, grouped by target
//! IP, prioritized, validated against robots.txt and quotas, and finally handed
//! to per-IP workers that respect per-host minimum intervals and shed load when
//! too many callers are waiting.

pub mod automaton;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod hash;
pub mod host;
pub mod pipeline;
pub mod queue;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;
pub mod valve;

use thiserror::Error;

/// Main error type for crawlgate operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Automaton error: {0}")]
    Automaton(#[from] automaton::AutomatonError),

    #[error("DNS resolution failed for {host}: {message}")]
    Dns { host: String, message: String },

    #[error("{what} used after shutdown")]
    Disposed { what: &'static str },

    #[error("Batch has no resolved target IP")]
    UnresolvedBatch,

    #[error("Batch mixes target IPs {first} and {other}")]
    MixedBatch {
        first: std::net::IpAddr,
        other: std::net::IpAddr,
    },

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Failed to write fetched output for {url}: {message}")]
    FatalOutput { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for crawlgate operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use hash::{Hash128, HashRange};
pub use pipeline::{Pipeline, PipelineStats};
pub use state::{FetchStatus, Issues, WorkItem};
