use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::types::{CacheStats, NewsItem};

/// Category that matches every item in [`NewsCache::get_items_by_category`].
pub const WILDCARD_CATEGORY: &str = "headlines";

/// An accepted item plus its insertion sequence, used to order items
/// that share a `published` timestamp.
#[derive(Debug, Clone)]
struct Entry {
    item: NewsItem,
    seq: u64,
}

/// Bounded, deduplicated store of news items.
///
/// Items are keyed by id (first writer wins) and indexed per source. After
/// every insertion the cache evicts the globally oldest items until it holds
/// at most `max_items`; eviction is not fair across feeds, so a busy feed can
/// push out another feed's older items.
///
/// The cache has no internal lock. Callers that share it must serialize
/// access themselves (the manager keeps it behind its own lock).
#[derive(Debug)]
pub struct NewsCache {
    items: HashMap<String, Entry>,
    items_by_feed: HashMap<String, Vec<String>>,
    last_update: HashMap<String, DateTime<Utc>>,
    max_items: usize,
    next_seq: u64,
}

impl NewsCache {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: HashMap::new(),
            items_by_feed: HashMap::new(),
            last_update: HashMap::new(),
            max_items,
            next_seq: 0,
        }
    }

    // ========================================================================
    // Insertion and Eviction
    // ========================================================================

    /// Adds an item, returning `false` if its id was already cached.
    ///
    /// An empty id is replaced by the item URL before the duplicate check.
    pub fn add_item(&mut self, mut item: NewsItem) -> bool {
        if item.id.is_empty() {
            item.id = item.url.clone();
        }

        if self.items.contains_key(&item.id) {
            tracing::debug!(id = %item.id, source = %item.source, "Dropping duplicate news item");
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.items_by_feed
            .entry(item.source.clone())
            .or_default()
            .push(item.id.clone());
        self.items.insert(item.id.clone(), Entry { item, seq });

        self.enforce_max_items();
        true
    }

    /// Evicts the globally oldest items until the cache is within bounds.
    fn enforce_max_items(&mut self) {
        if self.items.len() <= self.max_items {
            return;
        }

        let mut by_age: Vec<(DateTime<Utc>, u64, &str)> = self
            .items
            .values()
            .map(|e| (e.item.published, e.seq, e.item.id.as_str()))
            .collect();
        by_age.sort_unstable();

        let excess = self.items.len() - self.max_items;
        let doomed: Vec<String> = by_age
            .into_iter()
            .take(excess)
            .map(|(_, _, id)| id.to_string())
            .collect();

        for id in doomed {
            if let Some(entry) = self.items.remove(&id) {
                if let Some(ids) = self.items_by_feed.get_mut(&entry.item.source) {
                    if let Some(pos) = ids.iter().position(|i| *i == id) {
                        ids.remove(pos);
                    }
                }
                tracing::debug!(
                    id = %id,
                    source = %entry.item.source,
                    published = %entry.item.published,
                    "Evicted oldest news item"
                );
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Items whose category equals `category`, or every item when the
    /// category is [`WILDCARD_CATEGORY`]. Order is unspecified.
    pub fn get_items_by_category(&self, category: &str, limit: usize) -> Vec<NewsItem> {
        self.items
            .values()
            .filter(|e| category == WILDCARD_CATEGORY || e.item.category == category)
            .take(limit)
            .map(|e| e.item.clone())
            .collect()
    }

    /// Most recent items across all feeds, newest first.
    pub fn get_recent_items(&self, limit: usize) -> Vec<NewsItem> {
        let mut entries: Vec<&Entry> = self.items.values().collect();
        entries.sort_by(|a, b| {
            b.item
                .published
                .cmp(&a.item.published)
                .then(b.seq.cmp(&a.seq))
        });
        entries
            .into_iter()
            .take(limit)
            .map(|e| e.item.clone())
            .collect()
    }

    /// Recent items when `category` is empty or `"all"`, otherwise a
    /// category scan.
    pub fn get_latest_news(&self, category: &str, max_items: usize) -> Vec<NewsItem> {
        if category.is_empty() || category == "all" {
            self.get_recent_items(max_items)
        } else {
            self.get_items_by_category(category, max_items)
        }
    }

    /// Items currently held for one source, in insertion order.
    pub fn items_for_feed(&self, source: &str) -> Vec<NewsItem> {
        self.items_by_feed
            .get(source)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.items.get(id))
                    .map(|e| e.item.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    // ========================================================================
    // Mutation and Bookkeeping
    // ========================================================================

    /// Marks a cached item as read. Returns `false` for unknown ids.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.items.get_mut(id) {
            Some(entry) => {
                entry.item.read_status = true;
                true
            }
            None => false,
        }
    }

    pub fn update_feed_timestamp(&mut self, source: &str, when: DateTime<Utc>) {
        self.last_update.insert(source.to_string(), when);
    }

    pub fn last_update(&self, source: &str) -> Option<DateTime<Utc>> {
        self.last_update.get(source).copied()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_items: self.items.len(),
            feed_count: self.items_by_feed.len(),
            max_items: self.max_items,
            items_by_feed: self
                .items_by_feed
                .iter()
                .map(|(source, ids)| (source.clone(), ids.len()))
                .collect(),
        }
    }

    /// Removes all items and feed timestamps.
    pub fn clear(&mut self) {
        self.items.clear();
        self.items_by_feed.clear();
        self.last_update.clear();
    }
}
