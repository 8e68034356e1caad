//! Chunked fan-out over the feed registry.
//!
//! Fetches run `batch_size` at a time: every fetch in a chunk is issued
//! concurrently and all of them settle before the next chunk starts, so
//! peak in-flight requests never exceed the chunk size. Successes keep
//! registry order; failures are logged by the fetcher and skipped.

use std::time::{Duration, Instant};

use crate::feed::fetcher;
use crate::model::AggregateResult;
use crate::registry::FeedDescriptor;

/// Concurrent fetches per chunk.
pub const DEFAULT_BATCH_SIZE: usize = 15;

/// Result of one full orchestrator run.
///
/// An empty `aggregate` is a valid outcome here; deciding whether
/// "nothing succeeded" is an error belongs to the caller.
#[derive(Debug)]
pub struct BatchOutcome {
    pub aggregate: AggregateResult,
    /// Number of registry entries attempted (always the full registry).
    pub attempted: usize,
    /// Number of feeds dropped after fetch or parse failures.
    pub failed: usize,
    /// Wall-clock duration of the whole run; reported, never acted on.
    pub duration: Duration,
}

/// Fetch every registry entry and aggregate the successes.
///
/// Runs to completion; there is no mid-batch cancellation beyond each
/// feed's own timeout.
pub async fn aggregate_all(
    client: &reqwest::Client,
    registry: &[FeedDescriptor],
    batch_size: usize,
    timeout: Duration,
) -> BatchOutcome {
    let started = Instant::now();
    let batch_size = batch_size.max(1);

    let mut sources = Vec::with_capacity(registry.len());
    for chunk in registry.chunks(batch_size) {
        let fetches = chunk.iter().map(|d| fetcher::fetch_feed(client, d, timeout));
        // join_all settles every future and preserves input order, which
        // keeps successes in registry order within and across chunks.
        for outcome in futures::future::join_all(fetches).await {
            if let Some(result) = outcome {
                sources.push(result);
            }
        }
    }

    let duration = started.elapsed();
    let failed = registry.len() - sources.len();
    tracing::info!(
        attempted = registry.len(),
        succeeded = sources.len(),
        failed = failed,
        elapsed_ms = duration.as_millis() as u64,
        "Aggregate fetch complete"
    );

    BatchOutcome {
        aggregate: AggregateResult { sources },
        attempted: registry.len(),
        failed,
        duration,
    }
}
