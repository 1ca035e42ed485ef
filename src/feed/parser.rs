use anyhow::Result;
use chrono::{DateTime, Utc};
use feed_rs::parser;

/// Wire-format-neutral view of one feed entry.
#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub guid: Option<String>,
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// Wire-format-neutral view of a parsed RSS or Atom document.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: String,
    pub description: String,
    pub language: String,
    pub updated: Option<DateTime<Utc>>,
    pub entries: Vec<FeedEntry>,
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses RSS 0.9x/1.0/2.0, Atom or JSON Feed bytes.
///
/// Entries without an id keep `guid: None`; feed-rs would otherwise
/// synthesize one and hide the link fallback.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| FeedEntry {
            guid: non_empty(entry.id),
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            link: entry.links.into_iter().next().and_then(|l| non_empty(l.href)),
            description: entry.summary.and_then(|s| non_empty(s.content)),
            content: entry.content.and_then(|c| c.body).and_then(non_empty),
            published: entry.published,
            updated: entry.updated,
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content).unwrap_or_default(),
        description: feed.description.map(|d| d.content).unwrap_or_default(),
        language: feed.language.unwrap_or_default(),
        updated: feed.updated,
        entries,
    })
}
