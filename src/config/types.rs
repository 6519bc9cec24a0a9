use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for crawlgate
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub hosts: HostsConfig,
    pub intake: IntakeConfig,
    pub validation: ValidationConfig,
    pub scheduler: SchedulerConfig,
    pub output: OutputConfig,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler; also the token matched against robots.txt groups
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Full User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    /// Agent token used to pick a robots.txt group
    pub fn robots_token(&self) -> &str {
        &self.crawler_name
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "crawlgate".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/crawler".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

/// Per-host politeness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HostsConfig {
    /// Maximum number of host records kept in memory
    pub max_hosts: usize,

    /// Minimum time between two requests to the same host (milliseconds)
    pub min_interval_ms: u64,

    /// How long a downloaded robots.txt stays valid (hours)
    pub robots_ttl_hours: u64,
}

impl HostsConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_ttl_hours * 3600)
    }
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            max_hosts: 10_000,
            min_interval_ms: 1_000,
            robots_ttl_hours: 24,
        }
    }
}

/// Which slice of the hash space this node owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PartitionConfig {
    pub index: u32,
    pub count: u32,
}

/// Link intake, dedup and enrichment configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IntakeConfig {
    /// Number of recent URIs remembered for deduplication
    pub dedup_capacity: usize,

    /// Maximum number of enrichment tasks in flight
    pub max_enrichment_tasks: usize,

    /// Items per target-IP buffer before it is flushed
    pub max_batch_size: usize,

    /// Open per-IP buffers before the one being written is flushed
    pub max_open_buffers: usize,

    /// Schemes some fetcher can handle
    pub supported_schemes: Vec<String>,

    /// File extensions that are never worth fetching
    pub blocked_extensions: Vec<String>,

    /// Top-level domains that are never worth fetching
    pub blocked_tlds: Vec<String>,

    /// Domain patterns (`example.com` or `*.example.com`) that are blocked
    pub blocked_domains: Vec<String>,

    /// Restricts this node to one slice of the host hash space
    pub partition: Option<PartitionConfig>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        let owned =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            dedup_capacity: 100_000,
            max_enrichment_tasks: 32,
            max_batch_size: 64,
            max_open_buffers: 256,
            supported_schemes: owned(&["http", "https"]),
            blocked_extensions: owned(&[
                "7z", "avi", "bin", "bz2", "dmg", "exe", "gif", "gz", "iso", "jpeg", "jpg",
                "mkv", "mov", "mp3", "mp4", "msi", "png", "rar", "tar", "wav", "webm", "zip",
            ]),
            blocked_tlds: Vec::new(),
            blocked_domains: Vec::new(),
            partition: None,
        }
    }
}

/// Validation stage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ValidationConfig {
    /// Items with a priority value above this are rejected
    pub max_priority: u32,

    /// Items past this position in a batch are rejected
    pub max_chunk_size: usize,

    /// Number of recently scheduled target IPs remembered
    pub recent_ip_capacity: usize,

    /// Total number of items that may ever be accepted
    pub quota: Option<u64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_priority: 500_000,
            max_chunk_size: 32,
            recent_ip_capacity: 1_024,
            quota: None,
        }
    }
}

/// Fetch orchestration configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Maximum number of per-IP workers fetching at once
    pub max_concurrent_fetches: usize,

    /// Waiting callers at which the valve starts shedding
    pub pressure_threshold: usize,

    /// How long one politeness wait may take before the valve re-evaluates (milliseconds)
    pub valve_wait_ms: u64,

    /// How long an empty per-IP queue survives before removal (milliseconds)
    pub queue_grace_ms: u64,

    /// How often an idle worker re-polls its empty queue (milliseconds)
    pub idle_poll_ms: u64,

    /// Network failures after which a host's remaining queue is dropped
    pub max_network_issues: u32,

    /// How long a visited URI is considered fresh (hours)
    pub visited_ttl_hours: u64,

    /// Capacity of the bounded channels between stages
    pub channel_capacity: usize,

    /// Timeout applied to a single fetch (seconds)
    pub fetch_timeout_secs: u64,
}

impl SchedulerConfig {
    pub fn valve_wait(&self) -> Duration {
        Duration::from_millis(self.valve_wait_ms)
    }

    pub fn queue_grace(&self) -> Duration {
        Duration::from_millis(self.queue_grace_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn visited_ttl(&self) -> Duration {
        Duration::from_secs(self.visited_ttl_hours * 3600)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 16,
            pressure_threshold: 8,
            valve_wait_ms: 5_000,
            queue_grace_ms: 2_000,
            idle_poll_ms: 250,
            max_network_issues: 3,
            visited_ttl_hours: 24 * 7,
            channel_capacity: 64,
            fetch_timeout_secs: 30,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database holding visited URIs and host records
    pub database_path: String,

    /// Path of the TSV file fetched items are appended to
    pub results_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./crawlgate.db".to_string(),
            results_path: "./fetched.tsv".to_string(),
        }
    }
}

/// Settings that can change while the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSettings {
    pub max_concurrent_fetches: usize,
    pub pressure_threshold: usize,
}

impl From<&SchedulerConfig> for LiveSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_concurrent_fetches: config.max_concurrent_fetches,
            pressure_threshold: config.pressure_threshold,
        }
    }
}
