//! Configuration module for crawlgate
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Every key is optional; defaults live in the `Default` impls of the
//! section types.
//!
//! # Example
//!
//! ```no_run
//! use crawlgate::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawlgate.toml")).unwrap();
//! println!("Max concurrent fetches: {}", config.scheduler.max_concurrent_fetches);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, HostsConfig, IntakeConfig, LiveSettings, OutputConfig, PartitionConfig,
    SchedulerConfig, UserAgentConfig, ValidationConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
