//! Lifecycle owner for the background polling loop.
//!
//! [`FeedManager`] composes the scheduler, error tracker, fetcher and cache.
//! Exactly one background task polls feeds, one at a time; every public
//! method is a short synchronized call against the manager's own lock.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::feed::{
    ErrorTracker, FeedFetcher, FeedHealthStats, FetchError, SchedulerConfig, UpdateScheduler,
    DEFAULT_FETCH_TIMEOUT,
};
use crate::storage::{CacheStats, FeedDescriptor, FeedInfo, NewsCache, NewsItem};

pub const DEFAULT_MAX_CACHE_ITEMS: usize = 1000;
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Error Types
// ============================================================================

/// Configuration and lifecycle errors returned directly to the caller.
///
/// Per-feed fetch failures never appear here; they are absorbed by the
/// [`ErrorTracker`] and visible only through feed health.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A feed was registered without a URL
    #[error("Feed URL cannot be empty")]
    EmptyUrl,
    /// `start` was called while the background loop is still alive
    #[error("Feed manager is already running")]
    AlreadyRunning,
    /// The background loop did not exit within the stop timeout
    #[error("Background loop did not stop within {0:?}")]
    StopTimeout(Duration),
    /// The HTTP client could not be constructed
    #[error("Failed to initialize fetcher: {0}")]
    Fetcher(#[from] FetchError),
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Pause between `start` and the first scheduling decision
    pub startup_delay: Duration,
    /// How long `stop` waits for the loop to exit
    pub stop_timeout: Duration,
    /// Deadline for one feed's retrieve-and-parse
    pub fetch_timeout: Duration,
    pub max_cache_items: usize,
    pub scheduler: SchedulerConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            startup_delay: DEFAULT_STARTUP_DELAY,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_cache_items: DEFAULT_MAX_CACHE_ITEMS,
            scheduler: SchedulerConfig::default(),
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// State only the manager may mutate.
struct State {
    cache: NewsCache,
    scheduler: UpdateScheduler,
}

struct Inner {
    state: RwLock<State>,
    tracker: Arc<ErrorTracker>,
    fetcher: FeedFetcher,
    startup_delay: Duration,
}

#[derive(Default)]
struct Lifecycle {
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Lifecycle {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Background feed-ingestion engine.
pub struct FeedManager {
    inner: Arc<Inner>,
    lifecycle: Mutex<Lifecycle>,
    stop_timeout: Duration,
}

impl FeedManager {
    pub fn new(config: ManagerConfig) -> Result<Self, ManagerError> {
        let fetcher = FeedFetcher::new(config.fetch_timeout)?;
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Builds a manager around an existing fetcher. `config.fetch_timeout`
    /// is ignored in favor of the fetcher's own.
    pub fn with_fetcher(config: ManagerConfig, fetcher: FeedFetcher) -> Self {
        let state = State {
            cache: NewsCache::new(config.max_cache_items),
            scheduler: UpdateScheduler::new(config.scheduler),
        };

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(state),
                tracker: Arc::new(ErrorTracker::new()),
                fetcher,
                startup_delay: config.startup_delay,
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
            stop_timeout: config.stop_timeout,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Launches the background loop.
    ///
    /// `cancel` is the caller's cancellation signal: the loop exits once it
    /// reads `true`. A dropped sender never cancels.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, cancel: watch::Receiver<bool>) -> Result<(), ManagerError> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.is_running() {
            return Err(ManagerError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        lifecycle.handle = Some(tokio::spawn(run(inner, cancel, stop_rx)));
        lifecycle.stop_tx = Some(stop_tx);

        tracing::info!("Feed manager started");
        Ok(())
    }

    /// Signals the loop to exit and waits up to the stop timeout.
    ///
    /// On timeout the loop is left detached rather than aborted. Stopping a
    /// manager that is not running is a no-op.
    pub async fn stop(&self) -> Result<(), ManagerError> {
        let (stop_tx, handle) = {
            let mut lifecycle = self.lifecycle();
            (lifecycle.stop_tx.take(), lifecycle.handle.take())
        };

        let Some(mut handle) = handle else {
            return Ok(());
        };
        if let Some(tx) = stop_tx {
            // The receiver is gone only if the loop already exited
            let _ = tx.send(true);
        }

        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {
                tracing::info!("Feed manager stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Feed manager loop ended abnormally");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.stop_timeout,
                    "Feed manager loop did not stop in time"
                );
                Err(ManagerError::StopTimeout(self.stop_timeout))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle().is_running()
    }

    /// Registers a feed with the scheduler.
    ///
    /// Disabled feeds are ignored without error.
    pub async fn add_feed(&self, feed: FeedDescriptor) -> Result<(), ManagerError> {
        if feed.url.trim().is_empty() {
            return Err(ManagerError::EmptyUrl);
        }
        if !feed.enabled {
            tracing::debug!(feed = %feed.url, "Ignoring disabled feed");
            return Ok(());
        }

        tracing::info!(feed = %feed.url, name = %feed.name, category = %feed.category, "Added feed");
        self.inner.state.write().await.scheduler.add_feed(feed);
        Ok(())
    }

    /// Registered feeds in registration order.
    pub async fn feeds(&self) -> Vec<FeedDescriptor> {
        self.inner.state.read().await.scheduler.feeds()
    }

    /// Latest cached items for `category`, newest first.
    ///
    /// `""` and `"all"` select every category.
    pub async fn get_latest_news(&self, category: &str, max_items: usize) -> Vec<NewsItem> {
        self.inner
            .state
            .read()
            .await
            .cache
            .get_latest_news(category, max_items)
    }

    pub async fn mark_read(&self, id: &str) -> bool {
        self.inner.state.write().await.cache.mark_read(id)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.inner.state.read().await.cache.stats()
    }

    pub fn feed_health(&self, url: &str) -> FeedHealthStats {
        self.inner.tracker.get_feed_health(url)
    }

    pub fn all_feed_health(&self) -> Vec<FeedHealthStats> {
        self.inner.tracker.all_feed_health()
    }

    /// Shared handle for readers that should not contend on the manager lock.
    pub fn error_tracker(&self) -> Arc<ErrorTracker> {
        Arc::clone(&self.inner.tracker)
    }

    pub async fn validate_feed_url(&self, url: &str) -> Result<(), FetchError> {
        self.inner.fetcher.validate_feed_url(url).await
    }

    pub async fn get_feed_info(&self, url: &str) -> Result<FeedInfo, FetchError> {
        self.inner.fetcher.get_feed_info(url).await
    }
}

impl Drop for FeedManager {
    fn drop(&mut self) {
        if let Some(tx) = self.lifecycle().stop_tx.take() {
            let _ = tx.send(true);
        }
    }
}

// ============================================================================
// Background Loop
// ============================================================================

/// Resolves once `rx` observes `true`. Never resolves if the sender is dropped.
async fn signalled(rx: &mut watch::Receiver<bool>) {
    let sender_dropped = rx.wait_for(|&cancelled| cancelled).await.is_err();
    if sender_dropped {
        std::future::pending::<()>().await;
    }
}

async fn shutdown_requested(cancel: &mut watch::Receiver<bool>, stop: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = signalled(cancel) => {}
        _ = signalled(stop) => {}
    }
}

/// Sleeps for `wait`. Returns `false` if shutdown was requested first.
async fn pause(
    wait: Duration,
    cancel: &mut watch::Receiver<bool>,
    stop: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        biased;
        _ = shutdown_requested(cancel, stop) => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

async fn run(inner: Arc<Inner>, mut cancel: watch::Receiver<bool>, mut stop: watch::Receiver<bool>) {
    if !pause(inner.startup_delay, &mut cancel, &mut stop).await {
        tracing::debug!("Shutdown requested during startup delay");
        return;
    }

    loop {
        let (next, wait) = inner.state.read().await.scheduler.get_next_feed();

        if let Some(feed) = next {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut cancel, &mut stop) => {
                    tracing::debug!(feed = %feed.url, "Shutdown requested during fetch");
                    break;
                }
                _ = inner.update_feed(&feed) => {}
            }
        }

        tracing::debug!(wait = ?wait, "Waiting for next scheduling decision");
        if !pause(wait, &mut cancel, &mut stop).await {
            break;
        }
    }

    tracing::debug!("Feed manager loop exited");
}

impl Inner {
    /// One attempt at `feed`: skip check, fetch, record outcome, absorb items.
    ///
    /// Every attempt reschedules the feed, including skipped and failed ones;
    /// only successes count toward its adaptive interval.
    async fn update_feed(&self, feed: &FeedDescriptor) {
        let url = feed.url.as_str();
        self.tracker.record_attempt(url);

        if self.tracker.should_skip_feed(url) {
            tracing::debug!(feed = %url, "Skipping feed in backoff");
            self.state.write().await.scheduler.record_deferred(url, Utc::now());
            return;
        }

        match self.fetcher.fetch_feed(feed).await {
            Ok(items) => {
                self.tracker.record_success(url);

                let now = Utc::now();
                let mut state = self.state.write().await;
                let fetched = items.len();
                let added = items
                    .into_iter()
                    .map(|item| state.cache.add_item(item))
                    .filter(|&added| added)
                    .count();
                state.cache.update_feed_timestamp(&feed.name, now);
                state.scheduler.record_update(url, now);

                tracing::debug!(feed = %url, fetched, added, "Updated feed");
            }
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "Feed fetch failed");
                self.tracker.record_error(url, &e);
                self.state.write().await.scheduler.record_deferred(url, Utc::now());
            }
        }
    }
}
