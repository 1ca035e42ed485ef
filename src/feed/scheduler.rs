use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::storage::FeedDescriptor;

/// Base cadence for feeds that leave `update_freq` at zero.
const DEFAULT_UPDATE_FREQ_MINUTES: u32 = 30;
/// Feeds with more recorded updates than this poll 25% faster.
const RELIABLE_UPDATE_COUNT: u32 = 10;
/// Feeds with fewer recorded updates than this poll 25% slower.
const NEW_FEED_UPDATE_COUNT: u32 = 3;

/// Timing knobs for [`UpdateScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Wait reported when nothing is registered, and the upper bound on any wait
    pub default_poll_interval: Duration,
    /// Lower bound on the wait between two scheduling decisions
    pub min_recheck: Duration,
    /// Gap between the first due times of consecutively registered feeds
    pub initial_stagger: Duration,
    pub min_update_interval: Duration,
    pub max_update_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_poll_interval: Duration::from_secs(5 * 60),
            min_recheck: Duration::from_secs(30),
            initial_stagger: Duration::from_secs(10),
            min_update_interval: Duration::from_secs(15 * 60),
            max_update_interval: Duration::from_secs(4 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct ScheduledFeed {
    feed: FeedDescriptor,
    last_update: Option<DateTime<Utc>>,
    next_due: DateTime<Utc>,
    /// Successful updates only; drives the adaptive interval
    update_count: u32,
    priority: u8,
}

/// Category rank, 1 (most urgent) to 5. Breaks ties among equally overdue feeds.
fn category_priority(category: &str) -> u8 {
    match category {
        "breaking" | "alerts" => 1,
        "tech" | "gaming" => 2,
        "general" | "headlines" => 3,
        "entertainment" | "sports" => 4,
        _ => 5,
    }
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::days(365))
}

/// Picks the single most overdue feed and how long to wait before asking again.
///
/// Among feeds that are equally overdue the more urgent category wins, then
/// the earliest registered. Not synchronized: the manager is the only writer.
#[derive(Debug)]
pub struct UpdateScheduler {
    feeds: Vec<ScheduledFeed>,
    index: HashMap<String, usize>,
    config: SchedulerConfig,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl UpdateScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            feeds: Vec::new(),
            index: HashMap::new(),
            config,
        }
    }

    pub fn add_feed(&mut self, feed: FeedDescriptor) {
        self.add_feed_at(feed, Utc::now());
    }

    /// Registers a feed whose first update falls `initial_stagger` after the
    /// previously registered one.
    ///
    /// Re-registering a URL replaces its descriptor but keeps its schedule.
    pub fn add_feed_at(&mut self, feed: FeedDescriptor, now: DateTime<Utc>) {
        if let Some(&idx) = self.index.get(&feed.url) {
            tracing::debug!(feed = %feed.url, "Feed already scheduled, replacing descriptor");
            let scheduled = &mut self.feeds[idx];
            scheduled.priority = category_priority(&feed.category);
            scheduled.feed = feed;
            return;
        }

        let position = self.feeds.len();
        let stagger = self.config.initial_stagger.saturating_mul(position as u32);
        let next_due = now + to_delta(stagger);

        tracing::debug!(feed = %feed.url, first_due = %next_due, "Scheduled feed");
        self.index.insert(feed.url.clone(), position);
        self.feeds.push(ScheduledFeed {
            priority: category_priority(&feed.category),
            feed,
            last_update: None,
            next_due,
            update_count: 0,
        });
    }

    pub fn get_next_feed(&self) -> (Option<FeedDescriptor>, Duration) {
        self.get_next_feed_at(Utc::now())
    }

    /// Returns the most overdue enabled feed (if any is due) and the wait
    /// until the next decision.
    ///
    /// The wait is the time until the earliest other feed falls due, bounded
    /// below by `min_recheck` and above by `default_poll_interval`. With no
    /// feeds registered it is `default_poll_interval`.
    pub fn get_next_feed_at(&self, now: DateTime<Utc>) -> (Option<FeedDescriptor>, Duration) {
        let mut chosen: Option<usize> = None;
        for (idx, scheduled) in self.feeds.iter().enumerate() {
            if !scheduled.feed.enabled || scheduled.next_due > now {
                continue;
            }
            let key = (scheduled.next_due, scheduled.priority);
            if chosen.map_or(true, |c| key < (self.feeds[c].next_due, self.feeds[c].priority)) {
                chosen = Some(idx);
            }
        }

        let earliest_other = self
            .feeds
            .iter()
            .enumerate()
            .filter(|(idx, s)| Some(*idx) != chosen && s.feed.enabled)
            .map(|(_, s)| s.next_due)
            .min();

        let ceiling = self
            .config
            .default_poll_interval
            .max(self.config.min_recheck);
        let wait = match earliest_other {
            Some(due) => (due - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .clamp(self.config.min_recheck, ceiling),
            None => self.config.default_poll_interval,
        };

        (chosen.map(|idx| self.feeds[idx].feed.clone()), wait)
    }

    /// Records a successful update of `url` at `when` and schedules the next one.
    pub fn record_update(&mut self, url: &str, when: DateTime<Utc>) {
        self.reschedule(url, when, true);
    }

    /// Reschedules `url` after an attempt that produced no update (skipped or
    /// failed). The attempt does not count toward the adaptive interval.
    pub fn record_deferred(&mut self, url: &str, when: DateTime<Utc>) {
        self.reschedule(url, when, false);
    }

    fn reschedule(&mut self, url: &str, when: DateTime<Utc>, succeeded: bool) {
        let Some(&idx) = self.index.get(url) else {
            tracing::debug!(feed = %url, "Ignoring update for unscheduled feed");
            return;
        };

        let config = &self.config;
        let scheduled = &mut self.feeds[idx];
        scheduled.last_update = Some(when);
        if succeeded {
            scheduled.update_count = scheduled.update_count.saturating_add(1);
        }

        let interval = next_interval(config, &scheduled.feed, scheduled.update_count);
        scheduled.next_due = when + to_delta(interval);
        tracing::debug!(
            feed = %url,
            next_due = %scheduled.next_due,
            interval_secs = interval.as_secs(),
            "Feed rescheduled"
        );
    }

    pub fn next_due(&self, url: &str) -> Option<DateTime<Utc>> {
        self.index.get(url).map(|&idx| self.feeds[idx].next_due)
    }

    pub fn last_update(&self, url: &str) -> Option<DateTime<Utc>> {
        self.index.get(url).and_then(|&idx| self.feeds[idx].last_update)
    }

    /// Registered descriptors in registration order.
    pub fn feeds(&self) -> Vec<FeedDescriptor> {
        self.feeds.iter().map(|s| s.feed.clone()).collect()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

/// Adaptive cadence: the configured frequency, 25% faster for feeds with a
/// long update history and 25% slower for new ones, clamped to the
/// configured bounds.
fn next_interval(config: &SchedulerConfig, feed: &FeedDescriptor, update_count: u32) -> Duration {
    let minutes = if feed.update_freq == 0 {
        DEFAULT_UPDATE_FREQ_MINUTES
    } else {
        feed.update_freq
    };
    let mut interval = Duration::from_secs(u64::from(minutes) * 60);

    if update_count > RELIABLE_UPDATE_COUNT {
        interval = interval * 3 / 4;
    } else if update_count < NEW_FEED_UPDATE_COUNT {
        interval = interval * 5 / 4;
    }

    interval.clamp(
        config.min_update_interval,
        config.max_update_interval.max(config.min_update_interval),
    )
}
