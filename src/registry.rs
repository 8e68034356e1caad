//! Static feed source registry.
//!
//! The registry is a TOML listing of feed descriptors loaded once at
//! startup. Duplicate URLs are dropped (first occurrence wins); the
//! dedup is mandatory, so every descriptor downstream has a unique URL.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::model::SourceTags;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read feeds file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in feeds file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One configured feed source.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedDescriptor {
    /// Fetch endpoint; unique within the registry after load.
    pub url: String,
    /// Explicit icon override; wins over anything the feed declares.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub is_podcast: bool,
    #[serde(default)]
    pub is_top_channel: bool,
    #[serde(default)]
    pub is_up_and_coming: bool,
}

impl FeedDescriptor {
    pub fn tags(&self) -> SourceTags {
        SourceTags {
            is_podcast: self.is_podcast,
            is_top_channel: self.is_top_channel,
            is_up_and_coming: self.is_up_and_coming,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedsFile {
    #[serde(default)]
    feeds: Vec<FeedDescriptor>,
}

/// Load the registry from a TOML file and deduplicate it by URL.
pub fn load(path: &Path) -> Result<Vec<FeedDescriptor>, RegistryError> {
    let content = std::fs::read_to_string(path)?;
    let file: FeedsFile = toml::from_str(&content)?;
    let feeds = dedupe(file.feeds);
    tracing::info!(path = %path.display(), feeds = feeds.len(), "Loaded feed registry");
    Ok(feeds)
}

/// Drop descriptors whose URL was already seen, keeping the first.
pub fn dedupe(feeds: Vec<FeedDescriptor>) -> Vec<FeedDescriptor> {
    let total = feeds.len();
    let mut seen = HashSet::new();
    let retained: Vec<FeedDescriptor> = feeds
        .into_iter()
        .filter(|f| seen.insert(f.url.clone()))
        .collect();

    let dropped = total - retained.len();
    if dropped > 0 {
        tracing::info!(
            dropped = dropped,
            retained = retained.len(),
            "Dropped duplicate feed URLs from registry"
        );
    }

    retained
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(url: &str) -> FeedDescriptor {
        FeedDescriptor {
            url: url.to_string(),
            image: None,
            is_podcast: false,
            is_top_channel: false,
            is_up_and_coming: false,
        }
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let mut first = descriptor("https://a.example/rss");
        first.is_top_channel = true;
        let feeds = vec![
            first,
            descriptor("https://b.example/rss"),
            descriptor("https://a.example/rss"),
        ];

        let deduped = dedupe(feeds);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].url, "https://a.example/rss");
        assert!(deduped[0].is_top_channel, "first occurrence wins");
        assert_eq!(deduped[1].url, "https://b.example/rss");
    }

    #[test]
    fn test_dedupe_no_duplicates_is_identity() {
        let feeds = vec![descriptor("https://a.example/rss"), descriptor("https://b.example/rss")];
        let deduped = dedupe(feeds);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_load_parses_tags_and_defaults() {
        let dir = std::env::temp_dir().join("newswire_registry_test_load");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feeds.toml");
        std::fs::write(
            &path,
            r#"
[[feeds]]
url = "https://a.example/rss"
image = "https://a.example/logo.png"
is_top_channel = true

[[feeds]]
url = "https://b.example/rss"
is_podcast = true

[[feeds]]
url = "https://a.example/rss"
"#,
        )
        .unwrap();

        let feeds = load(&path).unwrap();
        assert_eq!(feeds.len(), 2, "duplicate dropped");
        assert_eq!(feeds[0].image.as_deref(), Some("https://a.example/logo.png"));
        assert!(feeds[0].is_top_channel);
        assert!(!feeds[0].is_podcast);
        assert!(feeds[1].is_podcast);
        assert!(!feeds[1].is_up_and_coming);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let path = Path::new("/tmp/newswire_registry_test_nonexistent.toml");
        assert!(matches!(load(path), Err(RegistryError::Io(_))));
    }

    #[test]
    fn test_load_empty_table_yields_no_feeds() {
        let dir = std::env::temp_dir().join("newswire_registry_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feeds.toml");
        std::fs::write(&path, "").unwrap();

        let feeds = load(&path).unwrap();
        assert!(feeds.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
