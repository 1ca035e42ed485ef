//! Feed retrieval and per-feed bookkeeping.
//!
//! - **Parsing**: RSS/Atom/JSON Feed bytes into a neutral entry model
//! - **Fetching**: deadline-bounded HTTP retrieval and item conversion
//! - **Error tracking**: exponential backoff and a 24h circuit breaker per feed
//! - **Scheduling**: picks the most overdue feed and how long to wait
//!
//! # Architecture
//!
//! - [`parser`] - feed parsing using the `feed-rs` crate
//! - [`fetcher`] - [`FeedFetcher`], turning a [`crate::storage::FeedDescriptor`] into news items
//! - [`error_tracker`] - [`ErrorTracker`], safe to share across tasks
//! - [`scheduler`] - [`UpdateScheduler`], single-owner state driven by the manager
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use feedpulse::feed::{ErrorTracker, FeedFetcher};
//! use feedpulse::storage::FeedDescriptor;
//!
//! # async fn run() -> Result<(), feedpulse::feed::FetchError> {
//! let fetcher = FeedFetcher::new(Duration::from_secs(30))?;
//! let tracker = ErrorTracker::new();
//! let feed = FeedDescriptor::new("https://example.org/rss", "Example", "tech");
//!
//! tracker.record_attempt(&feed.url);
//! match fetcher.fetch_feed(&feed).await {
//!     Ok(_items) => tracker.record_success(&feed.url),
//!     Err(e) => tracker.record_error(&feed.url, &e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod error_tracker;
pub mod fetcher;
pub mod parser;
pub mod scheduler;

pub use error_tracker::{ErrorTracker, FeedErrorInfo, FeedHealthStats, FeedState};
pub use fetcher::{FeedFetcher, FetchError, DEFAULT_FETCH_TIMEOUT, USER_AGENT};
pub use parser::{parse_feed, FeedEntry, ParsedFeed};
pub use scheduler::{SchedulerConfig, UpdateScheduler};
