//! Single-feed fetching.
//!
//! One descriptor in, `Option<FeedResult>` out. Every failure mode
//! (network, timeout, status, oversized body, unparseable XML, zero
//! articles) is converted to `None` with a diagnostic log; nothing
//! propagates to the orchestrator as an error.

use std::time::Duration;

use chrono::Utc;
use futures::stream::StreamExt;
use thiserror::Error;

use crate::feed::parser::{self, ParseError};
use crate::model::FeedResult;
use crate::registry::FeedDescriptor;

/// Hard per-feed deadline covering connect, headers, and body.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

const USER_AGENT: &str = concat!(
    "newswire/",
    env!("CARGO_PKG_VERSION"),
    " (RSS/Atom aggregator)"
);

const ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

/// Errors that can occur while fetching and normalizing one feed.
///
/// These never cross the fetcher boundary; [`fetch_feed`] logs them and
/// yields `None`.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code; never retried
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the per-feed deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Feed XML could not be parsed, even after sanitization
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// The document parsed but yielded no usable articles
    #[error("No parseable articles")]
    NoArticles,
}

/// Build the shared HTTP client with the aggregator's identity headers.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static(ACCEPT),
    );

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
}

/// Fetch and normalize one feed.
///
/// Returns `Some(FeedResult)` with at least one article, or `None` on
/// any failure. The failure is logged with the feed URL; callers treat
/// `None` as "drop this feed from the current aggregate".
pub async fn fetch_feed(
    client: &reqwest::Client,
    descriptor: &FeedDescriptor,
    timeout: Duration,
) -> Option<FeedResult> {
    match try_fetch(client, descriptor, timeout).await {
        Ok(result) => {
            tracing::debug!(
                feed = %descriptor.url,
                articles = result.articles.len(),
                "Fetched feed"
            );
            Some(result)
        }
        Err(e) => {
            tracing::warn!(feed = %descriptor.url, error = %e, "Dropping feed from aggregate");
            None
        }
    }
}

async fn try_fetch(
    client: &reqwest::Client,
    descriptor: &FeedDescriptor,
    timeout: Duration,
) -> Result<FeedResult, FetchError> {
    let bytes = tokio::time::timeout(timeout, fetch_bytes(client, &descriptor.url))
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;

    let feed = parser::parse_feed(&bytes)?;
    parser::normalize(feed, descriptor, Utc::now()).ok_or(FetchError::NoArticles)
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await.map_err(FetchError::Network)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: trust Content-Length when the server declares one
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test Feed</title>
    <link>https://feed.example</link>
    <item><title>Story</title><link>https://feed.example/1</link></item>
</channel></rss>"#;

    fn descriptor(url: &str) -> FeedDescriptor {
        FeedDescriptor {
            url: url.to_string(),
            image: None,
            is_podcast: false,
            is_top_channel: false,
            is_up_and_coming: false,
        }
    }

    async fn mock_feed(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = mock_feed(VALID_RSS).await;
        let client = build_client().unwrap();

        let result = fetch_feed(
            &client,
            &descriptor(&format!("{}/rss", server.uri())),
            DEFAULT_FETCH_TIMEOUT,
        )
        .await;

        let result = result.expect("valid feed should fetch");
        assert_eq!(result.source.title, "Test Feed");
        assert_eq!(result.articles.len(), 1);
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1) // a second request would mean a retry
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let result = fetch_feed(
            &client,
            &descriptor(&format!("{}/rss", server.uri())),
            DEFAULT_FETCH_TIMEOUT,
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_failure_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let result = fetch_feed(
            &client,
            &descriptor(&format!("{}/rss", server.uri())),
            DEFAULT_FETCH_TIMEOUT,
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_unrecoverable_body_is_failure() {
        let server = mock_feed("<not valid xml").await;
        let client = build_client().unwrap();

        let result = fetch_feed(
            &client,
            &descriptor(&format!("{}/rss", server.uri())),
            DEFAULT_FETCH_TIMEOUT,
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_zero_article_feed_is_failure() {
        let empty = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title><link>https://e.example</link></channel></rss>"#;
        let server = mock_feed(empty).await;
        let client = build_client().unwrap();

        let result = fetch_feed(
            &client,
            &descriptor(&format!("{}/rss", server.uri())),
            DEFAULT_FETCH_TIMEOUT,
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_slow_feed_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let result = fetch_feed(
            &client,
            &descriptor(&format!("{}/rss", server.uri())),
            Duration::from_millis(50),
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_is_failure() {
        let padding = "x".repeat(MAX_FEED_SIZE + 1);
        let server = mock_feed(&padding).await;
        let client = build_client().unwrap();

        let result = fetch_feed(
            &client,
            &descriptor(&format!("{}/rss", server.uri())),
            DEFAULT_FETCH_TIMEOUT,
        )
        .await;
        assert!(result.is_none());
    }
}
