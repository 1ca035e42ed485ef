use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use feedpulse::storage::FeedDescriptor;
use feedpulse::{Config, FeedManager};

#[derive(Parser, Debug)]
#[command(name = "feedpulse", about = "Background RSS/Atom news ingestion")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "feedpulse.toml")]
    config: PathBuf,

    /// Category to report ("all" for every category)
    #[arg(long, default_value = "all")]
    category: String,

    /// Number of items to report each interval
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Seconds between reports
    #[arg(long, value_name = "S", default_value_t = 60)]
    report_secs: u64,

    /// Validate every configured feed URL and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config.validate().context("Invalid configuration")?;

    let manager =
        FeedManager::new(config.manager_config()).context("Failed to create feed manager")?;

    if args.validate {
        return validate_feeds(&manager, &config.feeds).await;
    }

    if config.feeds.is_empty() {
        eprintln!(
            "Warning: no feeds configured in {}",
            args.config.display()
        );
    }
    for feed in config.feeds {
        let url = feed.url.clone();
        manager
            .add_feed(feed)
            .await
            .with_context(|| format!("Failed to register feed {url}"))?;
    }

    // The sender stays alive so the loop only ends through stop()
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    manager.start(cancel_rx)?;

    let mut report = tokio::time::interval(Duration::from_secs(args.report_secs.max(1)));
    // First tick completes immediately; nothing is cached yet
    report.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Shutdown requested");
                break;
            }
            _ = report.tick() => {
                report_latest(&manager, &args.category, args.count).await?;
            }
        }
    }

    manager.stop().await.context("Failed to stop feed manager")?;
    Ok(())
}

/// Prints the latest items as JSON lines and logs per-feed health.
async fn report_latest(manager: &FeedManager, category: &str, count: usize) -> Result<()> {
    for item in manager.get_latest_news(category, count).await {
        println!("{}", serde_json::to_string(&item)?);
    }

    for health in manager.all_feed_health() {
        tracing::info!(
            feed = %health.url,
            score = health.health_score,
            consecutive_errors = health.consecutive_errors,
            healthy = health.is_healthy,
            "Feed health"
        );
    }

    let stats = manager.cache_stats().await;
    tracing::info!(
        items = stats.total_items,
        feeds = stats.feed_count,
        max = stats.max_items,
        "Cache stats"
    );
    Ok(())
}

async fn validate_feeds(manager: &FeedManager, feeds: &[FeedDescriptor]) -> Result<()> {
    let mut failed = 0usize;
    for feed in feeds {
        match manager.validate_feed_url(&feed.url).await {
            Ok(()) => println!("ok      {}", feed.url),
            Err(e) => {
                failed += 1;
                println!("FAILED  {} ({})", feed.url, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} feeds failed validation", failed, feeds.len());
    }
    println!("All {} feeds valid", feeds.len());
    Ok(())
}
