use feed_rs::model::{Entry, FeedType, Link};
use feed_rs::parser;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::FeedItem;

/// An entry tagged with the document format it came from. Each format has
/// its own link rule; both end up as a `FeedItem`.
enum SourceEntry {
    Rss(Entry),
    Atom(Entry),
}

impl SourceEntry {
    fn url(&self) -> Option<String> {
        match self {
            SourceEntry::Rss(entry) => first_href(&entry.links).or_else(|| guid_url(entry)),
            SourceEntry::Atom(entry) => entry
                .links
                .iter()
                .find(|link| link.rel.as_deref() == Some("alternate") && !link.href.is_empty())
                .map(|link| link.href.clone())
                .or_else(|| first_href(&entry.links))
                .or_else(|| guid_url(entry)),
        }
    }

    fn normalize(self) -> Option<FeedItem> {
        let url = self.url()?;
        let entry = match self {
            SourceEntry::Rss(entry) | SourceEntry::Atom(entry) => entry,
        };

        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default();

        let description = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();

        Some(FeedItem {
            url,
            title,
            published_at: entry.published.or(entry.updated),
            description,
        })
    }
}

fn first_href(links: &[Link]) -> Option<String> {
    links
        .first()
        .map(|link| link.href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// `guid` / `id` only counts as a link when it actually is one.
fn guid_url(entry: &Entry) -> Option<String> {
    let id = entry.id.trim();
    match Url::parse(id) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(id.to_string()),
        _ => None,
    }
}

/// Parse an RSS 0.9x/1.0/2.0 or Atom document into normalized items, in
/// document order. Entries without any resolvable URL are dropped.
pub fn parse_items(bytes: &[u8]) -> Result<Vec<FeedItem>> {
    let feed = parser::parse(bytes)?;
    let is_atom = matches!(feed.feed_type, FeedType::Atom);

    let items: Vec<FeedItem> = feed
        .entries
        .into_iter()
        .map(|entry| {
            if is_atom {
                SourceEntry::Atom(entry)
            } else {
                SourceEntry::Rss(entry)
            }
        })
        .filter_map(|entry| {
            let item = entry.normalize();
            if item.is_none() {
                tracing::debug!("Skipping feed entry without a link");
            }
            item
        })
        .collect();

    if items.is_empty() {
        return Err(AppError::EmptyFeed);
    }

    Ok(items)
}

/// The first (most recent) item of the document.
pub fn parse_latest(bytes: &[u8]) -> Result<FeedItem> {
    parse_items(bytes)?
        .into_iter()
        .next()
        .ok_or(AppError::EmptyFeed)
}
