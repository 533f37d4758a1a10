//! Sumi-Crawler main entry point
//!
//! This is the command-line interface of the Sumi-Crawler web crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_crawler::config::{load_config_with_hash, Config};
use sumi_crawler::output::{load_statistics, print_report, print_statistics};
use sumi_crawler::storage::SqliteDataService;
use sumi_crawler::Crawler;
use tracing_subscriber::EnvFilter;

/// Sumi-Crawler: fetch, transform and follow
///
/// Sumi-Crawler crawls from the configured seed URLs while honoring
/// robots.txt, stores one access result per fetched URL and prints the
/// outcome counts of the session.
#[derive(Parser, Debug)]
#[command(name = "sumi-crawler")]
#[command(version)]
#[command(about = "A robots.txt-aware web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Override the session id from the configuration
    #[arg(long, value_name = "ID")]
    session_id: Option<String>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics of a stored session and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(session_id) = cli.session_id {
        config.crawler.session_id = Some(session_id);
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_crawler=info,warn"),
            1 => EnvFilter::new("sumi_crawler=debug,info"),
            2 => EnvFilter::new("sumi_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Crawler Dry Run ===\n");

    println!("Crawler:");
    println!("  Workers: {}", config.crawler.thread_count);
    match config.crawler.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unlimited"),
    }
    match config.crawler.max_access_count {
        Some(count) => println!("  Max access count: {}", count),
        None => println!("  Max access count: unlimited"),
    }
    println!("  Max retries: {}", config.crawler.max_retries);

    println!("\nClient:");
    println!("  User agent: {}", config.client.user_agent);
    match config.client.access_timeout_ms {
        Some(ms) => println!("  Access timeout: {}ms", ms),
        None => println!("  Access timeout: none"),
    }
    println!("  robots.txt: {}", config.client.robots_txt_enabled);

    println!("\nTransformer mappings ({}):", config.transformer.mappings.len());
    for mapping in &config.transformer.mappings {
        println!("  - {} -> {}", mapping.mime_type, mapping.transformer);
    }

    println!("\nSeeds ({}):", config.crawler.seeds.len());
    for seed in &config.crawler.seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: prints statistics from the results database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let Some(path) = &config.output.database_path else {
        bail!("--stats needs output.database-path in the configuration");
    };
    println!("Database: {}\n", path);

    let storage = SqliteDataService::new(Path::new(path))
        .with_context(|| format!("Failed to open {}", path))?;
    let stats = load_statistics(&storage, config.crawler.session_id.as_deref())?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<()> {
    tracing::info!("Total seed URLs: {}", config.crawler.seeds.len());

    let crawler = Crawler::new(Arc::new(config), config_hash)?;
    match crawler.run().await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
