//! End-to-end tests for the feed manager against local mock feeds.
//!
//! Every test runs its own mock server and manager with millisecond timings.

use feedpulse::feed::{FeedState, SchedulerConfig};
use feedpulse::{FeedDescriptor, FeedManager, ManagerConfig};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rss(items: &[(&str, &str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(guid, title, date)| {
            format!(
                "<item><guid>{guid}</guid><title>{title}</title>\
                 <link>https://example.com/{guid}</link>\
                 <description>About {title}</description>\
                 <pubDate>{date}</pubDate></item>"
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Mock</title>{body}</channel></rss>"#)
}

fn test_config() -> ManagerConfig {
    ManagerConfig {
        startup_delay: Duration::from_millis(10),
        stop_timeout: Duration::from_secs(2),
        fetch_timeout: Duration::from_secs(2),
        max_cache_items: 50,
        scheduler: SchedulerConfig {
            default_poll_interval: Duration::from_millis(50),
            min_recheck: Duration::from_millis(10),
            initial_stagger: Duration::ZERO,
            ..SchedulerConfig::default()
        },
    }
}

async fn mount(server: &MockServer, route: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .mount(server)
        .await;
}

async fn wait_for_items(manager: &FeedManager, count: usize) -> bool {
    for _ in 0..200 {
        if manager.get_latest_news("all", 100).await.len() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

async fn wait_for_error(manager: &FeedManager, url: &str) -> bool {
    for _ in 0..200 {
        if manager.feed_health(url).consecutive_errors > 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn test_broken_feed_does_not_block_healthy_feed() {
    let server = MockServer::start().await;
    mount(&server, "/broken", ResponseTemplate::new(503)).await;
    mount(
        &server,
        "/good",
        ResponseTemplate::new(200).set_body_string(rss(&[
            ("g1", "Kernel update", "Mon, 01 Jan 2024 10:00:00 GMT"),
            ("g2", "Compiler news", "Tue, 02 Jan 2024 10:00:00 GMT"),
        ])),
    )
    .await;

    let broken = format!("{}/broken", server.uri());
    let good = format!("{}/good", server.uri());

    let manager = FeedManager::new(test_config()).unwrap();
    // Registered first, so it is attempted before the good feed
    manager
        .add_feed(FeedDescriptor::new(&broken, "Broken", "general"))
        .await
        .unwrap();
    manager
        .add_feed(FeedDescriptor::new(&good, "Good", "tech"))
        .await
        .unwrap();

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    manager.start(cancel_rx).unwrap();

    assert!(wait_for_items(&manager, 2).await);
    assert!(wait_for_error(&manager, &broken).await);
    manager.stop().await.unwrap();

    let tracker = manager.error_tracker();
    assert!(matches!(
        tracker.feed_state(&broken),
        FeedState::Backoff { .. }
    ));
    assert_eq!(tracker.feed_state(&good), FeedState::Healthy);

    let broken_health = manager.feed_health(&broken);
    assert!(broken_health.last_success.is_none());
    assert_eq!(broken_health.last_error.as_deref(), Some("HTTP error: status 503"));

    let sources: Vec<_> = manager
        .get_latest_news("all", 100)
        .await
        .into_iter()
        .map(|i| i.source)
        .collect();
    assert_eq!(sources, vec!["Good", "Good"]);
}

#[tokio::test]
async fn test_keyword_filter_and_item_cap() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/mixed",
        ResponseTemplate::new(200).set_body_string(rss(&[
            ("m1", "Rust release", "Fri, 05 Jan 2024 10:00:00 GMT"),
            ("m2", "Cooking tips", "Thu, 04 Jan 2024 10:00:00 GMT"),
            ("m3", "More rust", "Wed, 03 Jan 2024 10:00:00 GMT"),
            ("m4", "Rust beyond the cap", "Tue, 02 Jan 2024 10:00:00 GMT"),
        ])),
    )
    .await;

    let mut feed = FeedDescriptor::new(format!("{}/mixed", server.uri()), "Mixed", "tech");
    feed.keywords = vec!["rust".to_string()];
    feed.max_items = 3;

    let manager = FeedManager::new(test_config()).unwrap();
    manager.add_feed(feed).await.unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    manager.start(cancel_rx).unwrap();

    assert!(wait_for_items(&manager, 2).await);
    // Allow a few more polls; the result must stay stable
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.stop().await.unwrap();

    let ids: Vec<_> = manager
        .get_latest_news("all", 100)
        .await
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(ids, vec!["m1", "m3"]);
}

#[tokio::test]
async fn test_repeated_polls_do_not_duplicate_items() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/stable",
        ResponseTemplate::new(200).set_body_string(rss(&[(
            "only",
            "Single story",
            "Mon, 01 Jan 2024 10:00:00 GMT",
        )])),
    )
    .await;

    let url = format!("{}/stable", server.uri());
    let manager = FeedManager::new(test_config()).unwrap();
    manager
        .add_feed(FeedDescriptor::new(&url, "Stable", "tech"))
        .await
        .unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    manager.start(cancel_rx).unwrap();

    assert!(wait_for_items(&manager, 1).await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    manager.stop().await.unwrap();

    assert_eq!(manager.cache_stats().await.total_items, 1);
    assert!(manager.feed_health(&url).is_healthy);
}

#[tokio::test]
async fn test_feed_info_and_validation_through_manager() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/info",
        ResponseTemplate::new(200).set_body_string(rss(&[(
            "i1",
            "Story",
            "Mon, 01 Jan 2024 10:00:00 GMT",
        )])),
    )
    .await;

    let manager = FeedManager::new(test_config()).unwrap();
    let url = format!("{}/info", server.uri());

    let info = manager.get_feed_info(&url).await.unwrap();
    assert_eq!(info.title, "Mock");
    assert_eq!(info.item_count, 1);

    // Served from 127.0.0.1, so validation short-circuits either way
    manager.validate_feed_url(&url).await.unwrap();
}

#[tokio::test]
async fn test_stop_interrupts_slow_fetch() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/slow",
        ResponseTemplate::new(200)
            .set_body_string(rss(&[]))
            .set_delay(Duration::from_secs(10)),
    )
    .await;

    let mut config = test_config();
    config.fetch_timeout = Duration::from_secs(30);
    let manager = FeedManager::new(config).unwrap();
    manager
        .add_feed(FeedDescriptor::new(
            format!("{}/slow", server.uri()),
            "Slow",
            "tech",
        ))
        .await
        .unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    manager.start(cancel_rx).unwrap();

    // Let the loop get into the fetch
    tokio::time::sleep(Duration::from_millis(200)).await;
    let started = std::time::Instant::now();
    manager.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}
