//! Shared domain types for aggregate results.
//!
//! These types are the unit of exchange between the fetch pipeline, the
//! freshness cache, and the response surface. They serialize with camelCase
//! field names so the cached JSON and the caller-facing payload keep the
//! shape the deployment's consumers already expect.

use serde::{Deserialize, Serialize};

/// Grouping tags carried from the registry onto a fetched source.
///
/// The flags are not mutually exclusive and are never validated beyond
/// these three; downstream presentation decides what to do with them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTags {
    #[serde(default)]
    pub is_podcast: bool,
    #[serde(default)]
    pub is_top_channel: bool,
    #[serde(default)]
    pub is_up_and_coming: bool,
}

/// One normalized feed item.
///
/// Articles exist only for the lifetime of an aggregate result; they are
/// never persisted individually or deduplicated across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    /// Absolute URL. Items whose link could not be made absolute are
    /// dropped during normalization rather than carried with a bad link.
    pub link: String,
    pub thumbnail: Option<String>,
    /// Epoch milliseconds, clamped so it never lies in the future.
    /// `None` when neither the item nor its feed reported a date.
    pub published_at: Option<i64>,
    pub summary: Option<String>,
}

/// Feed-level metadata resolved during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub title: String,
    /// Absolute link identifying the source site.
    pub canonical_link: String,
    pub image: Option<String>,
    /// Epoch milliseconds, clamped to the fetch instant.
    pub last_updated_at: Option<i64>,
    #[serde(flatten)]
    pub tags: SourceTags,
}

/// One feed's successful fetch outcome.
///
/// Only emitted when `articles` is non-empty; a feed yielding zero
/// parseable articles is treated as a fetch failure upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedResult {
    pub source: SourceInfo,
    pub articles: Vec<Article>,
}

/// The combined output of one orchestrator run, produced atomically.
///
/// `sources` follows registry order filtered by success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub sources: Vec<FeedResult>,
}
