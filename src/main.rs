//! crawlgate main entry point
//!
//! Feeds discovered links through the scheduling pipeline and appends every
//! fetch result to the configured results file.

use anyhow::Context;
use clap::Parser;
use crawlgate::config::{load_config_with_hash, Config};
use crawlgate::crawler::{build_http_client, HttpFetcher, SystemResolver, TsvSink};
use crawlgate::pipeline::{print_summary, Collaborators, DefaultPriorityModel, Pipeline};
use crawlgate::robots::HttpRobotsSource;
use crawlgate::storage::{open_storage, Persistence};
use crawlgate::{CrawlError, WorkItem};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use url::Url;

/// crawlgate: polite crawl scheduling
///
/// Reads links (one per line), deduplicates and validates them against
/// robots.txt, and fetches them with per-host rate limits.
#[derive(Parser, Debug)]
#[command(name = "crawlgate")]
#[command(version)]
#[command(about = "Polite crawl scheduling and host rate limiting", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// File of links to schedule; reads stdin when omitted
    ///
    /// Each line is either a work item line (`code\tpriority\tsource\ttarget`),
    /// a `source\ttarget` pair, or a bare target URL.
    #[arg(short, long, value_name = "FILE")]
    links: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and print the effective settings without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show visit statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        Ok(())
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_run(config, cli.links.as_deref()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawlgate=info,warn"),
            1 => EnvFilter::new("crawlgate=debug,info"),
            2 => EnvFilter::new("crawlgate=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== crawlgate Dry Run ===\n");

    println!("User Agent:");
    println!("  Header: {}", config.user_agent.header());
    println!("  Robots token: {}", config.user_agent.robots_token());

    println!("\nHosts:");
    println!("  Max hosts in memory: {}", config.hosts.max_hosts);
    println!("  Minimum interval: {}ms", config.hosts.min_interval_ms);
    println!("  Robots TTL: {}h", config.hosts.robots_ttl_hours);

    println!("\nIntake:");
    println!("  Dedup capacity: {}", config.intake.dedup_capacity);
    println!("  Enrichment tasks: {}", config.intake.max_enrichment_tasks);
    println!("  Batch size: {}", config.intake.max_batch_size);
    println!("  Schemes: {}", config.intake.supported_schemes.join(", "));
    println!("  Blocked domains: {}", config.intake.blocked_domains.len());
    if let Some(partition) = &config.intake.partition {
        println!("  Partition: {} of {}", partition.index, partition.count);
    }

    println!("\nValidation:");
    println!("  Max priority: {}", config.validation.max_priority);
    println!("  Max chunk size: {}", config.validation.max_chunk_size);
    match config.validation.quota {
        Some(quota) => println!("  Quota: {}", quota),
        None => println!("  Quota: none"),
    }

    println!("\nScheduler:");
    println!(
        "  Max concurrent fetches: {}",
        config.scheduler.max_concurrent_fetches
    );
    println!("  Pressure threshold: {}", config.scheduler.pressure_threshold);
    println!(
        "  Network issues before abandoning a host: {}",
        config.scheduler.max_network_issues
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Results: {}", config.output.results_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows visit counts from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let purged = storage.purge_expired(chrono::Utc::now())?;
    println!("Visited URIs: {}", storage.count_visited()?);
    println!("Expired visits purged: {}", purged);

    Ok(())
}

/// Runs the pipeline over the configured link source
async fn handle_run(config: Config, links: Option<&Path>) -> anyhow::Result<()> {
    let timeout = config.scheduler.fetch_timeout();
    let storage: Arc<dyn Persistence> =
        Arc::new(open_storage(Path::new(&config.output.database_path))?);
    let client = build_http_client(&config.user_agent, timeout)?;
    let sink = TsvSink::open(Path::new(&config.output.results_path)).await?;

    let collaborators = Collaborators {
        resolver: Arc::new(SystemResolver),
        fetcher: Arc::new(HttpFetcher::new(client)),
        robots: Arc::new(HttpRobotsSource::new(&config.user_agent, timeout)?),
        persistence: Some(storage),
        sink: Arc::new(sink),
        priority: Arc::new(DefaultPriorityModel::default()),
    };

    let pipeline = Pipeline::start(&config, collaborators);

    let fed = match links {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            feed(&pipeline, BufReader::new(file)).await
        }
        None => feed(&pipeline, BufReader::new(tokio::io::stdin())).await,
    };

    match pipeline.finish().await {
        Ok(stats) => {
            print_summary(&stats);
            fed
        }
        Err(e @ CrawlError::FatalOutput { .. }) => {
            tracing::error!("Stopped on output failure: {}", e);
            Err(e.into())
        }
        Err(e) => {
            tracing::error!("Pipeline failed: {}", e);
            Err(e.into())
        }
    }
}

/// Submits every parseable line until the reader is exhausted
async fn feed<R>(pipeline: &Pipeline, reader: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut submitted = 0usize;
    let mut skipped = 0usize;

    while let Some(line) = lines.next_line().await? {
        let Some(item) = parse_link_line(&line) else {
            if !line.trim().is_empty() {
                tracing::debug!("Skipping unparseable line: {}", line);
                skipped += 1;
            }
            continue;
        };

        match pipeline.submit(item).await {
            Ok(true) => submitted += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Intake stopped: {}", e);
                break;
            }
        }
    }

    tracing::info!("Submitted {} links ({} lines skipped)", submitted, skipped);
    Ok(())
}

fn parse_link_line(line: &str) -> Option<WorkItem> {
    if let Some(item) = WorkItem::from_line(line) {
        return Some(item);
    }

    let line = line.trim();
    match line.split_once('\t') {
        Some((source, target)) => {
            let source = Url::parse(source.trim()).ok();
            let target = Url::parse(target.trim()).ok()?;
            Some(WorkItem::new(target, source))
        }
        None if !line.is_empty() => Url::parse(line).ok().map(|t| WorkItem::new(t, None)),
        None => None,
    }
}
