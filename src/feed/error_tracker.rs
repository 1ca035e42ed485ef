//! Per-feed reliability tracking: exponential backoff, a circuit breaker and
//! a 0-100 health score.
//!
//! Each feed moves through an implicit state machine:
//!
//! ```text
//! Healthy --error--> Backoff(n) --error--> ... --10th error--> CircuitOpen
//!    ^                   |                                        |
//!    +-----success-------+------------success or 24h elapsed------+
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// First backoff step.
pub const BASE_BACKOFF: Duration = Duration::from_secs(60);
/// Hard ceiling on any backoff step.
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);
/// Consecutive error count at which the backoff stops doubling (multiplier 32).
const MAX_DOUBLING_STEP: u32 = 6;
/// Consecutive errors that open the circuit.
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 10;
/// Hours an open circuit suppresses a feed, measured from its last error.
pub const CIRCUIT_OPEN_HOURS: i64 = 24;

const RECENT_SUCCESS_HOURS: i64 = 24;
const HEALTHY_SCORE_THRESHOLD: u8 = 70;
const HEALTHY_MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Mutable reliability record for one feed. Entries are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedErrorInfo {
    pub url: String,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub total_attempts: u64,
    pub total_errors: u64,
    /// The feed is skipped until this instant; cleared on success
    pub backoff_until: Option<DateTime<Utc>>,
}

impl FeedErrorInfo {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }
}

/// Health summary for diagnostics and dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedHealthStats {
    pub url: String,
    /// 0-100, higher is healthier
    pub health_score: u8,
    /// Errors per attempt, 0.0-1.0
    pub error_rate: f64,
    pub consecutive_errors: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub is_healthy: bool,
}

/// Where a feed sits in the backoff/circuit-breaker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Healthy,
    Backoff {
        consecutive_errors: u32,
        until: DateTime<Utc>,
    },
    CircuitOpen {
        since: DateTime<Utc>,
    },
}

/// Computes the backoff window after `consecutive_errors` failures.
///
/// The base doubles from 1 minute per consecutive error up to the 6th error
/// (32 minutes) and never exceeds 1 hour. `entropy` selects a jitter offset
/// in [-25%, +25%) of the base at one-second granularity.
pub fn backoff_duration(consecutive_errors: u32, entropy: u64) -> Duration {
    let doublings = consecutive_errors.clamp(1, MAX_DOUBLING_STEP) - 1;
    let base = (BASE_BACKOFF * 2u32.pow(doublings)).min(MAX_BACKOFF);

    let jitter_secs = base.as_secs() / 4;
    if jitter_secs == 0 {
        return base;
    }
    let offset = entropy % (jitter_secs * 2);
    base - Duration::from_secs(jitter_secs) + Duration::from_secs(offset)
}

/// Clock-derived jitter source. Not cryptographic; it only has to keep
/// feeds that failed together from retrying together.
fn clock_entropy() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
        .unwrap_or(0)
}

/// Thread-safe registry of [`FeedErrorInfo`] keyed by feed URL.
///
/// A single coarse lock guards the map; call volume is bounded by
/// feed count times poll rate. This is the one component that may be
/// shared freely (behind an `Arc`) with readers outside the manager.
///
/// Every operation has an `*_at` variant taking the current time so state
/// transitions can be driven deterministically.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    feeds: Mutex<HashMap<String, FeedErrorInfo>>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, FeedErrorInfo>> {
        // Every update completes under the lock, so a poisoned map is still consistent.
        self.feeds.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Recording
    // ========================================================================

    pub fn record_attempt(&self, url: &str) {
        let mut feeds = self.lock();
        let info = feeds
            .entry(url.to_string())
            .or_insert_with(|| FeedErrorInfo::new(url));
        info.total_attempts += 1;
    }

    pub fn record_error(&self, url: &str, error: &dyn std::fmt::Display) {
        self.record_error_at(url, error, Utc::now(), clock_entropy());
    }

    /// Records a failure at `now`, jittering the backoff with `entropy`.
    ///
    /// `backoff_until` never moves backwards while errors accumulate.
    pub fn record_error_at(
        &self,
        url: &str,
        error: &dyn std::fmt::Display,
        now: DateTime<Utc>,
        entropy: u64,
    ) {
        let mut feeds = self.lock();
        let info = feeds
            .entry(url.to_string())
            .or_insert_with(|| FeedErrorInfo::new(url));

        info.consecutive_errors += 1;
        info.total_errors += 1;
        info.last_error = Some(error.to_string());
        info.last_error_time = Some(now);

        let delay = backoff_duration(info.consecutive_errors, entropy);
        let candidate = now + TimeDelta::from_std(delay).unwrap_or(TimeDelta::hours(1));
        info.backoff_until = Some(match info.backoff_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        });

        if info.consecutive_errors == CIRCUIT_BREAKER_THRESHOLD {
            tracing::info!(
                feed = %url,
                consecutive_errors = info.consecutive_errors,
                "Feed circuit breaker opened - suppressed for 24h or until a success"
            );
        } else {
            tracing::debug!(
                feed = %url,
                consecutive_errors = info.consecutive_errors,
                backoff_secs = delay.as_secs(),
                "Feed backing off"
            );
        }
    }

    pub fn record_success(&self, url: &str) {
        self.record_success_at(url, Utc::now());
    }

    pub fn record_success_at(&self, url: &str, now: DateTime<Utc>) {
        let mut feeds = self.lock();
        let info = feeds
            .entry(url.to_string())
            .or_insert_with(|| FeedErrorInfo::new(url));

        if info.consecutive_errors > 0 {
            tracing::info!(
                feed = %url,
                recovered_after = info.consecutive_errors,
                "Feed recovered"
            );
        }
        info.consecutive_errors = 0;
        info.last_success = Some(now);
        info.backoff_until = None;
    }

    // ========================================================================
    // Gating
    // ========================================================================

    pub fn should_skip_feed(&self, url: &str) -> bool {
        self.should_skip_feed_at(url, Utc::now())
    }

    /// Returns `true` while the feed is backing off or its circuit is open.
    ///
    /// Once the 24h circuit window has elapsed this call closes the circuit
    /// by resetting the consecutive error count.
    pub fn should_skip_feed_at(&self, url: &str, now: DateTime<Utc>) -> bool {
        let mut feeds = self.lock();
        let Some(info) = feeds.get_mut(url) else {
            return false;
        };

        if matches!(info.backoff_until, Some(until) if now < until) {
            return true;
        }

        if info.consecutive_errors >= CIRCUIT_BREAKER_THRESHOLD {
            let within_window = info
                .last_error_time
                .is_some_and(|t| now - t < TimeDelta::hours(CIRCUIT_OPEN_HOURS));
            if within_window {
                return true;
            }
            tracing::info!(feed = %url, "Feed circuit breaker closed after 24h quarantine");
            info.consecutive_errors = 0;
        }

        false
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub fn get_feed_health(&self, url: &str) -> FeedHealthStats {
        self.get_feed_health_at(url, Utc::now())
    }

    pub fn get_feed_health_at(&self, url: &str, now: DateTime<Utc>) -> FeedHealthStats {
        let feeds = self.lock();
        match feeds.get(url) {
            Some(info) => health_of(info, now),
            None => FeedHealthStats {
                url: url.to_string(),
                health_score: 100,
                error_rate: 0.0,
                consecutive_errors: 0,
                last_success: None,
                last_error: None,
                is_healthy: true,
            },
        }
    }

    /// Health of every feed seen so far, sorted by URL.
    pub fn all_feed_health(&self) -> Vec<FeedHealthStats> {
        let now = Utc::now();
        let feeds = self.lock();
        let mut stats: Vec<_> = feeds.values().map(|info| health_of(info, now)).collect();
        stats.sort_by(|a, b| a.url.cmp(&b.url));
        stats
    }

    pub fn feed_info(&self, url: &str) -> Option<FeedErrorInfo> {
        self.lock().get(url).cloned()
    }

    /// Current state without the self-healing side effect of
    /// [`should_skip_feed_at`](Self::should_skip_feed_at).
    pub fn feed_state_at(&self, url: &str, now: DateTime<Utc>) -> FeedState {
        let feeds = self.lock();
        let Some(info) = feeds.get(url) else {
            return FeedState::Healthy;
        };

        if info.consecutive_errors >= CIRCUIT_BREAKER_THRESHOLD {
            if let Some(since) = info.last_error_time {
                if now - since < TimeDelta::hours(CIRCUIT_OPEN_HOURS) {
                    return FeedState::CircuitOpen { since };
                }
            }
        }
        match info.backoff_until {
            Some(until) if now < until => FeedState::Backoff {
                consecutive_errors: info.consecutive_errors,
                until,
            },
            _ => FeedState::Healthy,
        }
    }

    pub fn feed_state(&self, url: &str) -> FeedState {
        self.feed_state_at(url, Utc::now())
    }
}

fn health_of(info: &FeedErrorInfo, now: DateTime<Utc>) -> FeedHealthStats {
    let health_score = health_score(info, now);
    let error_rate = if info.total_attempts > 0 {
        (info.total_errors as f64 / info.total_attempts as f64).min(1.0)
    } else {
        0.0
    };

    FeedHealthStats {
        url: info.url.clone(),
        health_score,
        error_rate,
        consecutive_errors: info.consecutive_errors,
        last_success: info.last_success,
        last_error: info.last_error.clone(),
        is_healthy: health_score >= HEALTHY_SCORE_THRESHOLD
            && info.consecutive_errors < HEALTHY_MAX_CONSECUTIVE_ERRORS,
    }
}

/// `100 * success_rate - min(10 * consecutive, 50) + 10 if success < 24h ago`,
/// clamped to 0-100. A feed with no recorded attempts has a success rate of 1.
fn health_score(info: &FeedErrorInfo, now: DateTime<Utc>) -> u8 {
    let base = if info.total_attempts == 0 {
        100
    } else {
        let successes = info.total_attempts.saturating_sub(info.total_errors);
        (successes * 100 / info.total_attempts) as i64
    };

    let penalty = (i64::from(info.consecutive_errors) * 10).min(50);
    let bonus = match info.last_success {
        Some(t) if now - t < TimeDelta::hours(RECENT_SUCCESS_HOURS) => 10,
        _ => 0,
    };

    (base - penalty + bonus).clamp(0, 100) as u8
}
