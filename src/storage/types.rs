use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-fetch item cap applied when a feed does not configure one.
pub const DEFAULT_MAX_ITEMS_PER_FETCH: usize = 10;

fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS_PER_FETCH
}

fn default_enabled() -> bool {
    true
}

// ============================================================================
// Feed Configuration
// ============================================================================

/// A single registered news source.
///
/// The `url` is the unique key: the scheduler, the error tracker and the
/// manager all index feeds by it. Descriptors are immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDescriptor {
    /// Feed URL (required)
    pub url: String,
    /// Display name, also used as the `source` of every item from this feed
    #[serde(default)]
    pub name: String,
    /// Free-text category, conventionally "tech", "gaming" or "general"
    #[serde(default)]
    pub category: String,
    /// Minutes between updates (0 = scheduler default)
    #[serde(default)]
    pub update_freq: u32,
    /// Maximum items taken from a single fetch (0 = default of 10)
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// OR-matched, case-insensitive filter over title and summary
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Disabled feeds are ignored at registration
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FeedDescriptor {
    /// Creates an enabled descriptor with default cadence and item cap.
    pub fn new(url: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            category: category.into(),
            update_freq: 0,
            max_items: DEFAULT_MAX_ITEMS_PER_FETCH,
            keywords: Vec::new(),
            enabled: true,
        }
    }

    /// Per-fetch cap with the zero value mapped to the default.
    pub fn effective_max_items(&self) -> usize {
        if self.max_items == 0 {
            DEFAULT_MAX_ITEMS_PER_FETCH
        } else {
            self.max_items
        }
    }
}

// ============================================================================
// News Items
// ============================================================================

/// A single article produced by a fetch.
///
/// Once accepted into the cache an item is never merged or refreshed; only
/// `read_status` changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Dedup key: GUID when present, otherwise the article URL
    pub id: String,
    pub title: String,
    /// HTML-stripped, at most 300 characters
    pub summary: String,
    pub url: String,
    pub published: DateTime<Utc>,
    pub category: String,
    /// Name of the feed the item came from
    pub source: String,
    #[serde(rename = "read")]
    pub read_status: bool,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Basic feed metadata, retrieved without converting entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedInfo {
    pub title: String,
    pub description: String,
    pub url: String,
    pub language: String,
    pub item_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_items: usize,
    /// Number of sources with at least one tracked slot
    pub feed_count: usize,
    pub max_items: usize,
    pub items_by_feed: HashMap<String, usize>,
}
