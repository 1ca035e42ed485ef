//! Background RSS/Atom ingestion engine.
//!
//! A [`FeedManager`] polls registered feeds one at a time on an adaptive
//! schedule, backs off failing feeds and opens a 24 hour circuit breaker
//! for persistently broken ones, and keeps a bounded, deduplicated cache of
//! the newest items for consumers to query.
//!
//! ```no_run
//! use feedpulse::{FeedDescriptor, FeedManager, ManagerConfig};
//! use tokio::sync::watch;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let manager = FeedManager::new(ManagerConfig::default())?;
//! manager
//!     .add_feed(FeedDescriptor::new("https://example.org/rss", "Example", "tech"))
//!     .await?;
//!
//! let (_cancel_tx, cancel_rx) = watch::channel(false);
//! manager.start(cancel_rx)?;
//! // ...
//! let latest = manager.get_latest_news("tech", 5).await;
//! manager.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod feed;
pub mod manager;
pub mod storage;
pub mod util;

pub use config::{Config, ConfigError};
pub use feed::{ErrorTracker, FeedFetcher, FeedHealthStats, FetchError};
pub use manager::{FeedManager, ManagerConfig, ManagerError};
pub use storage::{FeedDescriptor, NewsItem};
