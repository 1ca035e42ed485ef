//! Configuration file parser for `feedpulse.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::SchedulerConfig;
use crate::manager::ManagerConfig;
use crate::storage::FeedDescriptor;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Values parsed but cannot drive the engine.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on cached news items across all feeds.
    pub max_cache_items: usize,

    /// Deadline in seconds for retrieving and parsing one feed.
    pub fetch_timeout_secs: u64,

    /// Delay in seconds between start and the first poll.
    pub startup_delay_secs: u64,

    /// How long in seconds a stop request waits for the loop to exit.
    pub stop_timeout_secs: u64,

    /// Wait in seconds when nothing is scheduled; also the longest wait.
    pub default_poll_interval_secs: u64,

    /// Shortest wait in seconds between two scheduling decisions.
    pub min_recheck_secs: u64,

    /// Gap in seconds between the first polls of consecutive feeds.
    pub initial_stagger_secs: u64,

    pub min_update_interval_minutes: u64,
    pub max_update_interval_minutes: u64,

    /// Feeds to poll, from `[[feeds]]` tables.
    pub feeds: Vec<FeedDescriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cache_items: 1000,
            fetch_timeout_secs: 30,
            startup_delay_secs: 5,
            stop_timeout_secs: 5,
            default_poll_interval_secs: 300,
            min_recheck_secs: 30,
            initial_stagger_secs: 10,
            min_update_interval_minutes: 15,
            max_update_interval_minutes: 240,
            feeds: Vec::new(),
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "max_cache_items",
    "fetch_timeout_secs",
    "startup_delay_secs",
    "stop_timeout_secs",
    "default_poll_interval_secs",
    "min_recheck_secs",
    "initial_stagger_secs",
    "min_update_interval_minutes",
    "max_update_interval_minutes",
    "feeds",
];

const KNOWN_FEED_KEYS: &[&str] = &[
    "url",
    "name",
    "category",
    "update_freq",
    "max_items",
    "keywords",
    "enabled",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses configuration text. Blank input yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        Ok(toml::from_str(content)?)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cache_items == 0 {
            return Err(ConfigError::Invalid(
                "max_cache_items must be greater than 0".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.min_update_interval_minutes > self.max_update_interval_minutes {
            return Err(ConfigError::Invalid(format!(
                "min_update_interval_minutes ({}) exceeds max_update_interval_minutes ({})",
                self.min_update_interval_minutes, self.max_update_interval_minutes
            )));
        }
        if let Some(pos) = self.feeds.iter().position(|f| f.url.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("feed #{} has an empty url", pos + 1)));
        }
        Ok(())
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            startup_delay: Duration::from_secs(self.startup_delay_secs),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_cache_items: self.max_cache_items,
            scheduler: SchedulerConfig {
                default_poll_interval: Duration::from_secs(self.default_poll_interval_secs),
                min_recheck: Duration::from_secs(self.min_recheck_secs),
                initial_stagger: Duration::from_secs(self.initial_stagger_secs),
                min_update_interval: Duration::from_secs(
                    self.min_update_interval_minutes.saturating_mul(60),
                ),
                max_update_interval: Duration::from_secs(
                    self.max_update_interval_minutes.saturating_mul(60),
                ),
            },
        }
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for key in raw.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
        }
    }

    let Some(toml::Value::Array(feeds)) = raw.get("feeds") else {
        return;
    };
    for (idx, feed) in feeds.iter().enumerate() {
        let Some(table) = feed.as_table() else {
            continue;
        };
        for key in table.keys() {
            if !KNOWN_FEED_KEYS.contains(&key.as_str()) {
                tracing::warn!(feed = idx + 1, key = %key, "Unknown feed key in config file, ignoring");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_cache_items, 1000);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.startup_delay_secs, 5);
        assert!(config.feeds.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_matches_manager_defaults() {
        assert_eq!(Config::default().manager_config(), ManagerConfig::default());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedpulse_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.max_cache_items, 1000);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let dir = std::env::temp_dir().join("feedpulse_config_test_whitespace");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "   \n  \n  ").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_cache_items, 1000);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("feedpulse_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
max_cache_items = 250
fetch_timeout_secs = 10
min_recheck_secs = 5

[[feeds]]
url = "https://example.com/tech.xml"
name = "Tech"
category = "tech"
update_freq = 60
keywords = ["rust", "linux"]

[[feeds]]
url = "https://example.com/games.xml"
name = "Games"
category = "gaming"
max_items = 3
enabled = false
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_cache_items, 250);
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.startup_delay_secs, 5); // default
        assert_eq!(config.feeds.len(), 2);

        let tech = &config.feeds[0];
        assert_eq!(tech.update_freq, 60);
        assert_eq!(tech.max_items, 10); // default
        assert_eq!(tech.keywords, vec!["rust", "linux"]);
        assert!(tech.enabled); // default

        let games = &config.feeds[1];
        assert_eq!(games.max_items, 3);
        assert!(!games.enabled);

        let manager = config.manager_config();
        assert_eq!(manager.fetch_timeout, Duration::from_secs(10));
        assert_eq!(manager.scheduler.min_recheck, Duration::from_secs(5));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = r#"
max_cache_items = 5
totally_fake_key = "should not fail"

[[feeds]]
url = "https://example.com/rss"
colour = "blue"
"#;
        let config = Config::from_toml(content).unwrap();
        assert_eq!(config.max_cache_items, 5);
        assert_eq!(config.feeds.len(), 1);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::from_toml("max_cache_items = \"lots\"\n").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_cache() {
        let config = Config::from_toml("max_cache_items = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_intervals() {
        let config = Config::from_toml(
            "min_update_interval_minutes = 90\nmax_update_interval_minutes = 30\n",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_feed_url() {
        let config = Config::from_toml("[[feeds]]\nurl = \"\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("feed #1"));
    }

    #[test]
    fn test_huge_interval_saturates() {
        let config = Config::from_toml(&format!(
            "min_update_interval_minutes = {max}\nmax_update_interval_minutes = {max}\n",
            max = i64::MAX
        ))
        .unwrap();

        let manager = config.manager_config();
        assert_eq!(manager.scheduler.max_update_interval, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("feedpulse_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = "a".repeat(1_048_577);
        std::fs::write(&path, content).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
