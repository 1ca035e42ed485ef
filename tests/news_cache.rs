//! Integration tests for the news cache through the public storage API.
//!
//! Each test builds its own cache; nothing is shared between tests.

use chrono::{DateTime, TimeDelta, Utc};
use feedpulse::storage::{NewsCache, NewsItem, WILDCARD_CATEGORY};
use pretty_assertions::assert_eq;

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .to_utc()
}

fn item(id: &str, minutes: i64, category: &str, source: &str) -> NewsItem {
    NewsItem {
        id: id.to_string(),
        title: format!("Title {id}"),
        summary: String::new(),
        url: format!("https://example.com/{id}"),
        published: base_time() + TimeDelta::minutes(minutes),
        category: category.to_string(),
        source: source.to_string(),
        read_status: false,
    }
}

fn ids(items: &[NewsItem]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn test_two_slot_cache_keeps_newest_pair() {
    let mut cache = NewsCache::new(2);
    cache.add_item(item("A", 0, "tech", "feed"));
    cache.add_item(item("B", 1, "tech", "feed"));
    cache.add_item(item("C", 2, "tech", "feed"));

    assert_eq!(cache.len(), 2);
    assert!(!cache.contains("A"));
    assert_eq!(ids(&cache.get_latest_news("all", 10)), vec!["C", "B"]);
}

#[test]
fn test_busy_feed_evicts_quiet_feed_items() {
    let mut cache = NewsCache::new(3);
    cache.add_item(item("quiet-1", 0, "general", "Quiet"));
    for n in 1..=3 {
        cache.add_item(item(&format!("busy-{n}"), 10 + n, "tech", "Busy"));
    }

    assert!(cache.items_for_feed("Quiet").is_empty());
    assert_eq!(cache.items_for_feed("Busy").len(), 3);
    assert_eq!(cache.stats().items_by_feed.get("Busy"), Some(&3));
}

// ============================================================================
// Deduplication and Queries
// ============================================================================

#[test]
fn test_duplicate_insert_leaves_cache_unchanged() {
    let mut cache = NewsCache::new(10);
    assert!(cache.add_item(item("x", 0, "tech", "feed")));

    let before = cache.get_latest_news("all", 10);
    let mut changed = item("x", 5, "gaming", "other");
    changed.title = "Different".to_string();
    assert!(!cache.add_item(changed));

    assert_eq!(cache.get_latest_news("all", 10), before);
}

#[test]
fn test_latest_news_all_returns_everything_sorted() {
    let mut cache = NewsCache::new(10);
    for (id, minutes) in [("m", 5), ("e", 1), ("l", 9), ("a", 3)] {
        cache.add_item(item(id, minutes, "tech", "feed"));
    }

    let latest = cache.get_latest_news("all", 10);
    assert_eq!(ids(&latest), vec!["l", "m", "a", "e"]);
    assert_eq!(ids(&cache.get_latest_news("", 2)), vec!["l", "m"]);
}

#[test]
fn test_category_filter_and_wildcard() {
    let mut cache = NewsCache::new(10);
    cache.add_item(item("t1", 0, "tech", "feed"));
    cache.add_item(item("g1", 1, "gaming", "feed"));
    cache.add_item(item("t2", 2, "tech", "feed"));

    let mut tech = ids(&cache.get_latest_news("tech", 10))
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    tech.sort();
    assert_eq!(tech, vec!["t1", "t2"]);

    assert_eq!(cache.get_items_by_category(WILDCARD_CATEGORY, 10).len(), 3);
    assert!(cache.get_items_by_category("tech", 0).is_empty());
}

#[test]
fn test_mark_read_visible_in_queries() {
    let mut cache = NewsCache::new(10);
    cache.add_item(item("r", 0, "tech", "feed"));

    assert!(cache.mark_read("r"));
    assert!(cache.get_latest_news("all", 1)[0].read_status);
}
