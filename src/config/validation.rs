use crate::config::types::{
    Config, HostsConfig, IntakeConfig, OutputConfig, SchedulerConfig, UserAgentConfig,
    ValidationConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent_config(&config.user_agent)?;
    validate_hosts_config(&config.hosts)?;
    validate_intake_config(&config.intake)?;
    validate_validation_config(&config.validation)?;
    validate_scheduler_config(&config.scheduler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // The name doubles as the robots.txt agent token, so keep it a single token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_hosts_config(config: &HostsConfig) -> Result<(), ConfigError> {
    if config.max_hosts < 1 {
        return Err(ConfigError::Validation(
            "max_hosts must be >= 1".to_string(),
        ));
    }

    if config.robots_ttl_hours < 1 {
        return Err(ConfigError::Validation(
            "robots_ttl_hours must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_intake_config(config: &IntakeConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("dedup_capacity", config.dedup_capacity),
        ("max_enrichment_tasks", config.max_enrichment_tasks),
        ("max_batch_size", config.max_batch_size),
        ("max_open_buffers", config.max_open_buffers),
    ] {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    if config.supported_schemes.is_empty() {
        return Err(ConfigError::Validation(
            "supported_schemes cannot be empty".to_string(),
        ));
    }

    for pattern in &config.blocked_domains {
        validate_domain_pattern(pattern)?;
    }

    if let Some(partition) = config.partition {
        if partition.count < 1 || partition.index >= partition.count {
            return Err(ConfigError::Validation(format!(
                "partition index {} must be below count {}",
                partition.index, partition.count
            )));
        }
    }

    Ok(())
}

fn validate_validation_config(config: &ValidationConfig) -> Result<(), ConfigError> {
    if config.max_chunk_size < 1 {
        return Err(ConfigError::Validation(
            "max_chunk_size must be >= 1".to_string(),
        ));
    }

    if config.recent_ip_capacity < 1 {
        return Err(ConfigError::Validation(
            "recent_ip_capacity must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 4_096 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 4096, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.pressure_threshold < 1 {
        return Err(ConfigError::Validation(
            "pressure_threshold must be >= 1".to_string(),
        ));
    }

    // An unbounded valve wait would stall shedding forever
    if config.valve_wait_ms < 1 {
        return Err(ConfigError::Validation(
            "valve_wait_ms must be >= 1".to_string(),
        ));
    }

    if config.idle_poll_ms < 1 || config.idle_poll_ms > config.queue_grace_ms.max(1) {
        return Err(ConfigError::Validation(format!(
            "idle_poll_ms must be between 1 and queue_grace_ms ({}), got {}",
            config.queue_grace_ms, config.idle_poll_ms
        )));
    }

    if config.max_network_issues < 1 {
        return Err(ConfigError::Validation(
            "max_network_issues must be >= 1".to_string(),
        ));
    }

    if config.channel_capacity < 1 {
        return Err(ConfigError::Validation(
            "channel_capacity must be >= 1".to_string(),
        ));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.results_path.is_empty() {
        return Err(ConfigError::Validation(
            "results_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a domain pattern (supports a `*.` wildcard prefix)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain pattern '{}' has no domain",
            pattern
        )));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with(['.', '-']) || domain.ends_with(['.', '-']) || domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' has a misplaced '.' or '-'",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}
