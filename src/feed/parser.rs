//! Feed parsing and normalization.
//!
//! [`parse_feed`] turns raw bytes into a `feed-rs` document, retrying a
//! single time through the sanitizer when the first parse fails.
//! [`normalize`] then resolves the document against its registry
//! descriptor into the domain model: decoded titles, an absolute
//! canonical link, the icon fallback chain, and clamped timestamps.

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use thiserror::Error;
use url::Url;

use crate::feed::sanitize;
use crate::model::{Article, FeedResult, SourceInfo};
use crate::registry::FeedDescriptor;
use crate::util::decode_entities;

#[derive(Debug, Error)]
pub enum ParseError {
    /// Unparseable even after the sanitization pass.
    #[error("malformed feed: {0}")]
    Malformed(String),
}

/// Parse feed bytes, retrying exactly once through the sanitizer.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, ParseError> {
    let first = match feed_rs::parser::parse(bytes) {
        Ok(feed) => return Ok(feed),
        Err(e) => e,
    };

    let repaired = sanitize::sanitize(&String::from_utf8_lossy(bytes));
    match feed_rs::parser::parse(repaired.as_bytes()) {
        Ok(feed) => {
            tracing::debug!(error = %first, "Sanitization pass recovered a malformed feed");
            Ok(feed)
        }
        Err(second) => Err(ParseError::Malformed(format!(
            "{first}; after sanitization: {second}"
        ))),
    }
}

/// Resolve a parsed document into a [`FeedResult`].
///
/// Returns `None` when no usable articles survive: a feed with zero
/// articles is a failed fetch, not an empty success. Items are dropped
/// individually (no link at all, for instance) without affecting their
/// siblings.
pub fn normalize(feed: Feed, descriptor: &FeedDescriptor, now: DateTime<Utc>) -> Option<FeedResult> {
    let feed_url = &descriptor.url;
    let canonical_link = resolve_canonical_link(&feed, feed_url);

    let title = feed
        .title
        .as_ref()
        .map(|t| decode_entities(&t.content).into_owned())
        .unwrap_or_else(|| "Untitled".to_string());

    let image = descriptor
        .image
        .clone()
        .or_else(|| feed.logo.as_ref().map(|l| l.uri.clone()))
        .or_else(|| feed.icon.as_ref().map(|i| i.uri.clone()));

    let last_updated_at = feed
        .updated
        .or_else(|| feed.entries.first().and_then(|e| e.published.or(e.updated)))
        .map(|ts| clamp_future(ts, now, feed_url, "feed last-updated"));

    let articles: Vec<Article> = feed
        .entries
        .iter()
        .filter_map(|entry| normalize_entry(entry, &canonical_link, last_updated_at, now, feed_url))
        .collect();

    if articles.is_empty() {
        tracing::debug!(feed = %feed_url, "No usable articles after normalization");
        return None;
    }

    Some(FeedResult {
        source: SourceInfo {
            title,
            canonical_link,
            image,
            last_updated_at,
            tags: descriptor.tags(),
        },
        articles,
    })
}

/// Feed's own absolute link, else the origin of the first item's
/// absolute link, else the URL we fetched.
fn resolve_canonical_link(feed: &Feed, requested: &str) -> String {
    if let Some(link) = feed.links.iter().find_map(|l| absolute(&l.href)) {
        return link;
    }

    let first_item_origin = feed
        .entries
        .first()
        .and_then(|e| e.links.first())
        .and_then(|l| Url::parse(l.href.trim()).ok())
        .filter(|u| u.has_host())
        .map(|u| u.origin().ascii_serialization());
    if let Some(origin) = first_item_origin {
        return origin;
    }

    requested.to_string()
}

fn absolute(href: &str) -> Option<String> {
    let trimmed = href.trim();
    let parsed = Url::parse(trimmed).ok()?;
    parsed.has_host().then(|| trimmed.to_string())
}

fn normalize_entry(
    entry: &Entry,
    canonical_link: &str,
    feed_updated: Option<i64>,
    now: DateTime<Utc>,
    feed_url: &str,
) -> Option<Article> {
    let raw_link = match entry.links.first().map(|l| l.href.trim()).filter(|h| !h.is_empty()) {
        Some(href) => href,
        None => {
            tracing::debug!(feed = %feed_url, "Skipping item without a link");
            return None;
        }
    };
    // Relative item links fall back to the source's canonical link.
    let link = absolute(raw_link).unwrap_or_else(|| canonical_link.to_string());

    let title = entry
        .title
        .as_ref()
        .map(|t| decode_entities(&t.content).into_owned())
        .unwrap_or_else(|| "Untitled".to_string());

    let summary = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .map(|s| decode_entities(&s).into_owned());

    let published_at = entry
        .published
        .or(entry.updated)
        .map(|ts| clamp_future(ts, now, feed_url, "item publish date"))
        .or(feed_updated);

    Some(Article {
        title,
        link,
        thumbnail: resolve_thumbnail(entry),
        published_at,
        summary,
    })
}

/// Media thumbnails win over media content URLs. feed-rs flattens
/// `media:group` children and maps RSS enclosures into media content,
/// so the two probes cover grouped thumbnails, direct thumbnails,
/// enclosures, and `media:content` in that order of preference.
fn resolve_thumbnail(entry: &Entry) -> Option<String> {
    for media in &entry.media {
        if let Some(thumb) = media.thumbnails.first() {
            return Some(thumb.image.uri.clone());
        }
    }
    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = content.url.as_ref() {
                return Some(url.to_string());
            }
        }
    }
    None
}

fn clamp_future(ts: DateTime<Utc>, now: DateTime<Utc>, feed_url: &str, field: &str) -> i64 {
    if ts > now {
        tracing::warn!(
            feed = %feed_url,
            field = field,
            reported = %ts,
            "Clamping future timestamp to now"
        );
        now.timestamp_millis()
    } else {
        ts.timestamp_millis()
    }
}
