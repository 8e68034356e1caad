//! The refresh coordinator: serves aggregate reads through the cache.
//!
//! One logical request walks a small state machine: a fresh entry is
//! returned as-is; a stale entry is returned immediately while a
//! background refresh is kicked off; an expired or missing entry forces
//! a blocking fetch. A failed blocking fetch falls back to whatever
//! entry still exists, however old, and only reports an error to the
//! caller when there is nothing at all to serve.
//!
//! At most one background refresh runs per process, claimed through a
//! compare-and-swap on an atomic flag. The flag is released by a drop
//! guard, so a refresh that panics cannot wedge it. The flag is
//! per-process only: multiple deployed instances can each run their own
//! refresh concurrently (fleet-wide single-flight would need a
//! distributed lock, which this design does not provide).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::feed;
use crate::model::FeedResult;
use crate::registry::FeedDescriptor;
use crate::storage::{classify, AgeReport, CacheEntry, CacheStore, Freshness};

const NO_FALLBACK_ERROR: &str = "all feeds failed to fetch and no cached copy was available";
const STALE_FALLBACK_ERROR: &str = "fresh fetch failed; serving the previous cached copy";

/// Caller-facing result of one aggregate read.
#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub sources: Vec<FeedResult>,
    /// Set only on total failure with nothing cached to fall back on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "_cache")]
    pub cache: CacheMeta,
}

/// Cache observability attached to every response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMeta {
    /// Age of the served data in milliseconds (0 for freshly fetched).
    pub age: u64,
    pub age_minutes: u64,
    pub stale: bool,
    pub refreshing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the blocking fetch, when one happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_duration: Option<u64>,
}

/// Outcome of a background-refresh trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Refreshing,
    Skipped,
}

/// Clears the in-progress flag on every exit path of a refresh task.
struct RefreshGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct Coordinator {
    store: CacheStore,
    client: reqwest::Client,
    registry: Arc<Vec<FeedDescriptor>>,
    batch_size: usize,
    fetch_timeout: Duration,
    refreshing: Arc<AtomicBool>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(
        store: CacheStore,
        client: reqwest::Client,
        registry: Vec<FeedDescriptor>,
        batch_size: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            client,
            registry: Arc::new(registry),
            batch_size,
            fetch_timeout,
            refreshing: Arc::new(AtomicBool::new(false)),
            refresh_task: Mutex::new(None),
        }
    }

    /// Serve one aggregate read according to cache freshness.
    pub async fn read(&self, force_clear: bool) -> FeedResponse {
        if force_clear {
            tracing::info!("Forced cache clear requested");
            self.store.clear().await;
            return self.fetch_blocking(None).await;
        }

        let entry = match self.store.get().await {
            Some(entry) => entry,
            None => return self.fetch_blocking(None).await,
        };

        let report = classify(entry.timestamp, Utc::now().timestamp_millis());
        match report.class {
            Freshness::Fresh => {
                tracing::debug!(age_minutes = report.age_minutes, "Serving fresh cache");
                Self::cached(entry, report, false, self.is_refreshing(), None)
            }
            Freshness::Stale => {
                tracing::info!(
                    age_minutes = report.age_minutes,
                    "Cache stale, serving while revalidating"
                );
                self.trigger_refresh();
                // The flag is set either by our trigger or by the refresh
                // that beat us to it; both mean "a refresh is running".
                Self::cached(entry, report, true, true, None)
            }
            Freshness::Expired => {
                tracing::info!(age_minutes = report.age_minutes, "Cache expired, fetching fresh");
                self.fetch_blocking(Some(entry)).await
            }
        }
    }

    /// Kick off a background refresh unless one is already running.
    ///
    /// Fire-and-forget: the caller gets a status immediately and the
    /// refresh outcome is observed by whoever reads the cache next.
    pub fn trigger_refresh(&self) -> RefreshStatus {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("Background refresh already running, skipping trigger");
            return RefreshStatus::Skipped;
        }

        let guard = RefreshGuard {
            flag: Arc::clone(&self.refreshing),
        };
        let client = self.client.clone();
        let registry = Arc::clone(&self.registry);
        let store = self.store.clone();
        let batch_size = self.batch_size;
        let timeout = self.fetch_timeout;

        let handle = tokio::spawn(async move {
            let _guard = guard;
            tracing::info!("Background refresh started");
            let outcome = feed::aggregate_all(&client, &registry, batch_size, timeout).await;
            let elapsed_ms = outcome.duration.as_millis() as u64;
            if outcome.aggregate.sources.is_empty() {
                tracing::warn!("Background refresh produced no sources, keeping previous entry");
                return;
            }
            let sources = outcome.aggregate.sources.len();
            store.set(outcome.aggregate).await;
            tracing::info!(sources, elapsed_ms, "Background refresh complete");
        });

        if let Ok(mut slot) = self.refresh_task.lock() {
            *slot = Some(handle);
        }
        RefreshStatus::Refreshing
    }

    /// Whether a background refresh is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// Await the most recently spawned refresh, if any.
    ///
    /// The read path never calls this; it exists so a one-shot process
    /// (and tests) can let an in-flight refresh land before exiting.
    pub async fn join_refresh(&self) {
        let handle = match self.refresh_task.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Delete the cache entry.
    pub async fn clear_cache(&self) -> bool {
        self.store.clear().await
    }

    async fn fetch_blocking(&self, fallback: Option<CacheEntry>) -> FeedResponse {
        let outcome =
            feed::aggregate_all(&self.client, &self.registry, self.batch_size, self.fetch_timeout)
                .await;
        let duration_ms = outcome.duration.as_millis() as u64;

        if outcome.aggregate.sources.is_empty() {
            tracing::error!(attempted = outcome.attempted, "Fresh fetch produced no sources");
            return match fallback {
                Some(entry) => {
                    let report = classify(entry.timestamp, Utc::now().timestamp_millis());
                    tracing::warn!(
                        age_minutes = report.age_minutes,
                        "Falling back to previous cache entry"
                    );
                    Self::cached(
                        entry,
                        report,
                        true,
                        self.is_refreshing(),
                        Some(STALE_FALLBACK_ERROR.to_string()),
                    )
                }
                None => FeedResponse {
                    sources: Vec::new(),
                    error: Some(NO_FALLBACK_ERROR.to_string()),
                    cache: CacheMeta {
                        age: 0,
                        age_minutes: 0,
                        stale: false,
                        refreshing: self.is_refreshing(),
                        error: Some(NO_FALLBACK_ERROR.to_string()),
                        fetch_duration: Some(duration_ms),
                    },
                },
            };
        }

        // Write failures are logged inside the store and swallowed; the
        // fresh data is served either way.
        self.store.set(outcome.aggregate.clone()).await;

        FeedResponse {
            sources: outcome.aggregate.sources,
            error: None,
            cache: CacheMeta {
                age: 0,
                age_minutes: 0,
                stale: false,
                refreshing: self.is_refreshing(),
                error: None,
                fetch_duration: Some(duration_ms),
            },
        }
    }

    fn cached(
        entry: CacheEntry,
        report: AgeReport,
        stale: bool,
        refreshing: bool,
        error: Option<String>,
    ) -> FeedResponse {
        FeedResponse {
            sources: entry.data.sources,
            error: None,
            cache: CacheMeta {
                age: report.age_ms,
                age_minutes: report.age_minutes,
                stale,
                refreshing,
                error,
                fetch_duration: None,
            },
        }
    }
}
