use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use siphon::feed::{build_client, FetchResult};
use siphon::{Config, Database, Scheduler};

#[derive(Parser, Debug)]
#[command(
    name = "siphon",
    version,
    about = "Poll RSS, Atom and JSON feeds into SQLite"
)]
struct Args {
    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = "siphon.toml")]
    config: PathBuf,

    /// Database file (overrides config and SIPHON_DATABASE_PATH)
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Run a single pass over due feeds, then exit
    #[arg(long, conflicts_with = "refresh_all")]
    once: bool,

    /// Fetch every feed once regardless of schedule, then exit
    #[arg(long)]
    refresh_all: bool,

    /// Subscribe to a feed and fetch it immediately
    #[arg(long, value_name = "URL")]
    add_feed: Option<String>,

    /// Display name for --add-feed (defaults to the URL)
    #[arg(long, requires = "add_feed")]
    name: Option<String>,

    /// Fetch interval in minutes for --add-feed
    #[arg(long, value_name = "MINUTES", requires = "add_feed")]
    interval: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    if let Some(path) = &args.database {
        config.database_path = path.clone();
    }
    config.validate().context("Invalid configuration")?;

    // RUST_LOG wins over the configured level.
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("Invalid log_level '{}'", config.log_level))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        database = %config.database_path,
        fetch_interval_minutes = config.fetch_interval_minutes,
        "Starting siphon"
    );

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;
    let client = build_client(&config).context("Failed to build HTTP client")?;
    let scheduler = Scheduler::from_config(Arc::new(db.clone()), client, &config);

    let first_fetch = match &args.add_feed {
        Some(url) => {
            let interval = match args.interval {
                Some(minutes) => minutes,
                None => i64::try_from(config.default_feed_interval_minutes)
                    .context("default_feed_interval_minutes out of range")?,
            };
            let feed_id = db
                .insert_feed(args.name.as_deref().unwrap_or(""), url, interval)
                .await
                .with_context(|| format!("Failed to add feed {}", url))?;
            println!("Added feed {} ({})", feed_id, url);
            Some(scheduler.spawn_refresh(feed_id))
        }
        None => None,
    };

    if args.refresh_all || args.once {
        // The new feed is no longer due once its first fetch lands.
        finish_first_fetch(first_fetch).await;

        let results = if args.refresh_all {
            scheduler
                .refresh_all()
                .await
                .context("Failed to list feeds")?
        } else {
            scheduler.run_due_pass(&CancellationToken::new()).await
        };
        print_results(&results);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let handle = scheduler.spawn(shutdown.clone());

    wait_for_shutdown_signal().await?;
    shutdown.cancel();
    handle.await.context("Scheduler task panicked")?;

    finish_first_fetch(first_fetch).await;
    Ok(())
}

async fn finish_first_fetch(handle: Option<JoinHandle<FetchResult>>) {
    let Some(handle) = handle else {
        return;
    };
    match handle.await {
        Ok(result) => print_results(std::slice::from_ref(&result)),
        Err(e) => tracing::error!(error = %e, "Initial fetch task failed"),
    }
}

fn print_results(results: &[FetchResult]) {
    for r in results {
        match &r.result {
            Ok(inserted) => println!("feed {}: {} new item(s)", r.feed_id, inserted),
            Err(e) => println!("feed {}: error: {}", r.feed_id, e),
        }
    }
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            biased;

            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Received SIGINT, shutting down gracefully");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }

    Ok(())
}
