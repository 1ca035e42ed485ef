//! In-memory news storage.
//!
//! - [`NewsCache`] - bounded, deduplicated item store with oldest-first eviction
//! - `types` - feed descriptors, news items and diagnostic snapshots
//!
//! Nothing here is persisted; the cache lives for the lifetime of the manager.

mod news_cache;
mod types;

pub use news_cache::{NewsCache, WILDCARD_CATEGORY};
pub use types::{CacheStats, FeedDescriptor, FeedInfo, NewsItem, DEFAULT_MAX_ITEMS_PER_FETCH};
