//! Comic-Updater main entry point
//!
//! This is the command-line interface for the Comic-Updater page discovery engine.

use anyhow::Context;
use clap::{Parser, Subcommand};
use comic_updater::config::{load_config_with_hash, Config};
use comic_updater::storage::{open_storage, PageStore, SqliteStorage, UpdatePolicy};
use comic_updater::updater::{run_auto_updates, HttpSource, UpdateEvent, UpdateMode, Updater};
use comic_updater::{normalize_url, RequestGate};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

/// Comic-Updater: next-page discovery for web comics
///
/// Comic-Updater keeps a local, ordered copy of web comics that have no feed
/// or API, finding each new page by following the site's own links.
#[derive(Parser, Debug)]
#[command(name = "comic-updater")]
#[command(version = "1.0.0")]
#[command(about = "Next-page discovery for web comics", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a comic by the URL of one of its pages
    Add {
        url: String,

        /// Seconds between automatic updates
        #[arg(long, default_value_t = 86_400)]
        interval: u64,

        /// Maximum number of unread pages to collect (-1 = no limit)
        #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
        limit: i64,

        /// Exclude the comic from automatic updates
        #[arg(long)]
        manual: bool,
    },

    /// List registered comics
    List,

    /// Look for new pages of a comic
    Update {
        id: i64,

        /// Keep fetching until no new page is found or the limit is reached
        #[arg(long)]
        binge: bool,
    },

    /// Run the auto-update scheduler until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let storage = open_storage(Path::new(&config.storage.database_path))
        .with_context(|| format!("Failed to open {}", config.storage.database_path))?;

    match cli.command {
        Command::Add {
            url,
            interval,
            limit,
            manual,
        } => {
            let policy = UpdatePolicy {
                enabled: !manual,
                interval_secs: interval,
                page_limit: limit,
            };
            handle_add(storage, &url, policy)
        }
        Command::List => handle_list(&storage),
        Command::Update { id, binge } => {
            let mode = if binge {
                UpdateMode::MultiplePages
            } else {
                UpdateMode::SinglePage
            };
            handle_update(config, storage, id, mode).await
        }
        Command::Watch => handle_watch(config, storage).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("comic_updater=info,warn"),
            1 => EnvFilter::new("comic_updater=debug,info"),
            2 => EnvFilter::new("comic_updater=trace,debug"),
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

fn build_updater(config: &Config, storage: SqliteStorage) -> anyhow::Result<Updater> {
    let gate = RequestGate::new(&config.http).context("Failed to build HTTP client")?;
    let source = HttpSource::new(Arc::new(gate));

    Ok(Updater::new(
        Arc::new(source),
        Arc::new(Mutex::new(storage)),
        config.updater.clone(),
    ))
}

/// Handles `add`: registers a comic
fn handle_add(mut storage: SqliteStorage, url: &str, policy: UpdatePolicy) -> anyhow::Result<()> {
    let url = normalize_url(url).with_context(|| format!("Invalid comic URL: {}", url))?;
    let comic = storage.create_comic(url.as_str(), policy)?;

    println!("✓ Added comic {} ({})", comic.id, comic.url);
    Ok(())
}

/// Handles `list`: prints every comic with its page counts
fn handle_list(storage: &SqliteStorage) -> anyhow::Result<()> {
    let comics = storage.list_comics()?;
    if comics.is_empty() {
        println!("No comics registered");
        return Ok(());
    }

    for comic in comics {
        let pages = storage.get_pages(comic.id)?;
        let unread = storage.count_new_pages(comic.id)?;
        let updated = comic
            .updated_at
            .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());

        println!("[{}] {}", comic.id, comic.url);
        println!(
            "    pages: {} ({} new), bookmark: {}, updated: {}",
            pages.len(),
            unread,
            comic.bookmark + 1,
            updated
        );
    }

    Ok(())
}

/// Handles `update`: runs one update and stops it on Ctrl-C
async fn handle_update(
    config: Config,
    storage: SqliteStorage,
    comic_id: i64,
    mode: UpdateMode,
) -> anyhow::Result<()> {
    storage
        .get_comic(comic_id)
        .with_context(|| format!("Unknown comic {}", comic_id))?;

    let updater = build_updater(&config, storage)?;
    let events = updater.subscribe();
    let printer = tokio::spawn(print_events(events));

    let run = updater
        .start(comic_id, mode)
        .context("An update is already running for this comic")?;

    let stopper = updater.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping update");
            stopper.stop(comic_id);
        }
    });

    let response = run.await.context("Update task failed")?;
    ctrl_c.abort();
    drop(updater);
    let _ = printer.await;

    if response.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Update did not complete: {}", response)
    }
}

/// Handles `watch`: runs the auto-update scheduler until Ctrl-C
async fn handle_watch(config: Config, storage: SqliteStorage) -> anyhow::Result<()> {
    let updater = build_updater(&config, storage)?;
    let printer = tokio::spawn(print_events(updater.subscribe()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(run_auto_updates(updater.clone(), shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Interrupted, shutting down");

    let _ = shutdown_tx.send(true);
    scheduler.await.context("Scheduler task failed")?;

    // Let stopped runs report their final event
    while !updater.running().is_empty() {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    drop(updater);
    let _ = printer.await;

    Ok(())
}

/// Prints run progress until every sender is gone
async fn print_events(mut events: broadcast::Receiver<UpdateEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(progress) = &event.progress {
                    println!("[{}] {}", event.comic_id, progress);
                }
                if let Some(response) = event.response.as_ref().filter(|_| event.is_final()) {
                    println!("[{}] {} update finished: {}", event.comic_id, event.mode, response);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Skipped {} progress events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
