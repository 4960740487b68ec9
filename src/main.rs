//! fb-pages-crawler main entry point
//!
//! This is the command-line interface for the Graph API pages crawler.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::Parser;
use fb_pages_crawler::config::{load_config_with_hash, Config};
use fb_pages_crawler::crawler::{
    list_targets, register_targets, remove_targets, BatchIdentityRefresher, CrawlEngine,
    CrawlRequest, RefreshOutcome,
};
use fb_pages_crawler::graph::{GraphClient, HttpGraphClient, OperatorLog};
use fb_pages_crawler::output::{load_statistics, print_statistics};
use fb_pages_crawler::storage::open_storage;
use fb_pages_crawler::url::GraphEndpoint;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

/// fb-pages-crawler: an incremental Graph API crawler
///
/// Crawls the feeds of registered pages and groups, with their comments and
/// likes, into SQLite. Re-crawls only touch a recent window; repeated
/// crawls never duplicate rows.
#[derive(Parser, Debug)]
#[command(name = "fb-pages-crawler")]
#[command(version)]
#[command(about = "An incremental Graph API pages crawler", long_about = None)]
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

    /// Crawl only these target IDs (default: every registered target)
    #[arg(long, value_delimiter = ',', value_name = "ID,..")]
    targets: Vec<String>,

    /// Run a single pass even if an update period is configured
    #[arg(long)]
    once: bool,

    /// Backfill start date (YYYY-MM-DD); requires --until
    #[arg(long, requires = "until")]
    since: Option<NaiveDate>,

    /// Backfill end date (YYYY-MM-DD); requires --since
    #[arg(long, requires = "since")]
    until: Option<NaiveDate>,

    /// Look up and register targets, then exit
    #[arg(long, value_delimiter = ',', value_name = "ID,..", conflicts_with_all = ["remove_targets", "list_targets", "refresh_actors", "stats"])]
    add_targets: Vec<String>,

    /// Remove targets and their crawled data, then exit
    #[arg(long, value_delimiter = ',', value_name = "ID,..", conflicts_with_all = ["add_targets", "list_targets", "refresh_actors", "stats"])]
    remove_targets: Vec<String>,

    /// List registered targets and exit
    #[arg(long, conflicts_with_all = ["add_targets", "remove_targets", "refresh_actors", "stats"])]
    list_targets: bool,

    /// Run one identity refresh over unresolved actors and exit
    #[arg(long, conflicts_with_all = ["add_targets", "remove_targets", "list_targets", "stats"])]
    refresh_actors: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["add_targets", "remove_targets", "list_targets", "refresh_actors"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);
    let config = Arc::new(config);

    let (log, messages) = OperatorLog::channel(config.crawl.verbose_errors);
    let printer = tokio::spawn(print_messages(messages));

    let client: Arc<dyn GraphClient> =
        Arc::new(HttpGraphClient::new(&config.graph).context("Failed to build HTTP client")?);
    let engine = CrawlEngine::new(config.clone(), config_hash, client, log);

    // Handle different modes
    let result = if !cli.add_targets.is_empty() {
        handle_add_targets(&engine, &cli.add_targets).await
    } else if !cli.remove_targets.is_empty() {
        handle_remove_targets(&config, &cli.remove_targets)
    } else if cli.list_targets {
        handle_list_targets(&config)
    } else if cli.refresh_actors {
        handle_refresh_actors(&engine).await
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&engine, &cli).await
    };

    // Dropping the last log sender lets the printer drain and stop
    drop(engine);
    let _ = printer.await;

    result
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("fb_pages_crawler=info,warn"),
            1 => EnvFilter::new("fb_pages_crawler=debug,info"),
            2 => EnvFilter::new("fb_pages_crawler=trace,debug"),
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

/// Prints operator messages as they arrive
async fn print_messages(mut messages: UnboundedReceiver<String>) {
    while let Some(message) = messages.recv().await {
        println!("{}", message);
    }
}

/// Handles --add-targets: one bulk lookup, then registration
async fn handle_add_targets(engine: &CrawlEngine, ids: &[String]) -> anyhow::Result<()> {
    let config = engine.config();
    let endpoint = GraphEndpoint::from_config(&config.graph).context("Invalid base-url")?;
    let mut storage = open_storage(&config.storage).context("Failed to open database")?;

    let report = register_targets(&engine.fetcher(), &endpoint, &mut storage, ids).await?;

    println!("Registered {} new target(s)", report.inserted.len());
    for id in &report.existing {
        println!("  already registered: {}", id);
    }
    for id in &report.missing {
        println!("  not found: {}", id);
    }
    Ok(())
}

/// Handles --remove-targets
fn handle_remove_targets(config: &Config, ids: &[String]) -> anyhow::Result<()> {
    let mut storage = open_storage(&config.storage).context("Failed to open database")?;
    let removed = remove_targets(&mut storage, ids)?;
    println!("Removed {} target(s)", removed);
    Ok(())
}

/// Handles --list-targets
fn handle_list_targets(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(&config.storage).context("Failed to open database")?;
    let targets = list_targets(&storage)?;

    println!("Targets ({}):", targets.len());
    for target in targets {
        let elapsed = target
            .last_elapsed_secs
            .map(|secs| format!("{:.1}s", secs))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {}{} last: {} ({})",
            target.id,
            target.name,
            if target.is_fresh { " [fresh]" } else { "" },
            target.last_outcome.as_deref().unwrap_or("never"),
            elapsed
        );
    }
    Ok(())
}

/// Handles --refresh-actors
async fn handle_refresh_actors(engine: &CrawlEngine) -> anyhow::Result<()> {
    let refresher = BatchIdentityRefresher::new(engine.config().clone(), engine.fetcher())?;
    let mut storage = open_storage(&engine.config().storage).context("Failed to open database")?;

    match refresher.run(&mut storage).await? {
        RefreshOutcome::Completed {
            batches,
            resolved,
            abandoned,
        } => println!(
            "Refreshed {} actor(s) in {} batch(es), {} abandoned",
            resolved, batches, abandoned
        ),
        RefreshOutcome::Skipped => println!("Another refresh is running"),
    }
    Ok(())
}

/// Handles --stats
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);
    let storage = open_storage(&config.storage).context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(engine: &CrawlEngine, cli: &Cli) -> anyhow::Result<()> {
    let config = engine.config().clone();

    let target_ids = if cli.targets.is_empty() {
        let storage = open_storage(&config.storage).context("Failed to open database")?;
        list_targets(&storage)?
            .into_iter()
            .map(|target| target.id)
            .collect()
    } else {
        cli.targets.clone()
    };
    if target_ids.is_empty() {
        bail!("No crawl targets registered; add some with --add-targets");
    }

    let mut request = CrawlRequest::new(target_ids);
    request.once = cli.once;
    if let (Some(since), Some(until)) = (cli.since, cli.until) {
        request = request.with_range(since, until);
    }

    let continuous = !cli.once && config.crawl.update_period().is_some();
    tracing::info!(
        targets = request.target_ids.len(),
        continuous,
        "Starting crawl"
    );

    // Continuous mode keeps actor identities fresh alongside the crawl
    let refresher = if continuous {
        Some(BatchIdentityRefresher::new(config.clone(), engine.fetcher())?)
    } else {
        None
    };

    let handle = engine.start(request)?;
    let cancel = handle.cancellation_token();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Cancellation requested");
                cancel.cancel();
            }
        });
    }

    let refresher = refresher.map(|refresher| {
        let token = cancel.clone();
        tokio::spawn(async move {
            refresher.run_periodic(token).await;
        })
    });

    let result = handle.wait().await;
    cancel.cancel();
    if let Some(refresher) = refresher {
        let _ = refresher.await;
    }

    let summary = result?;
    tracing::info!(
        pass_id = summary.pass_id,
        done = summary.targets_done,
        abandoned = summary.targets_abandoned,
        posts = summary.posts,
        "Crawl finished"
    );
    Ok(())
}
