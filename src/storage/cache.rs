//! Persisted single-entry cache for the aggregate result.
//!
//! The backing store is SQLite holding one logical key whose value is
//! the JSON-serialized [`CacheEntry`]. Writes replace the entry
//! wholesale; there is no partial update, so readers never observe a
//! torn entry. Store failures are converted to "miss" on read and
//! `false` on write; callers never see an error, only logs do.

use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

use crate::model::AggregateResult;

/// The one logical key this deployment uses.
const CACHE_KEY: &str = "aggregate";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS feed_cache (key TEXT PRIMARY KEY, value TEXT NOT NULL)";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Cache entry serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The persisted cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: AggregateResult,
    /// Epoch milliseconds at write time.
    pub timestamp: i64,
    /// Denormalized `data.sources.len()` for cheap inspection.
    pub feed_count: usize,
    /// Crate version that wrote the entry.
    pub version: String,
}

impl CacheEntry {
    /// Wrap an aggregate with the current instant and metadata.
    pub fn now(data: AggregateResult) -> Self {
        Self {
            feed_count: data.sources.len(),
            timestamp: Utc::now().timestamp_millis(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data,
        }
    }
}

/// Handle to the cache database. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    /// Open (and create if missing) the cache database at `path`.
    ///
    /// `":memory:"` opens an in-memory store, used by tests. A single
    /// connection keeps read-after-write strict: a `get` immediately
    /// after a `set` on this handle observes the write.
    pub async fn open(path: &str) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Read the entry, if any.
    ///
    /// Absence and store unavailability both yield `None`; they are
    /// logged distinctly so outages are diagnosable.
    pub async fn get(&self) -> Option<CacheEntry> {
        match self.try_get().await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(error = %e, "Cache store unavailable, treating read as miss");
                None
            }
        }
    }

    async fn try_get(&self) -> Result<Option<CacheEntry>, CacheError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM feed_cache WHERE key = ?")
            .bind(CACHE_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => {
                tracing::debug!("No cache entry present");
                Ok(None)
            }
            Some((value,)) => Ok(Some(serde_json::from_str(&value)?)),
        }
    }

    /// Stamp `data` with the current instant and store it, replacing
    /// any prior entry. Returns whether the write landed.
    pub async fn set(&self, data: AggregateResult) -> bool {
        self.put(CacheEntry::now(data)).await
    }

    /// Store an exact entry. Used by `set` and by backfill/testing
    /// paths that need control over the timestamp.
    pub async fn put(&self, entry: CacheEntry) -> bool {
        match self.try_put(&entry).await {
            Ok(()) => {
                tracing::debug!(feed_count = entry.feed_count, "Cache entry written");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to write cache entry");
                false
            }
        }
    }

    async fn try_put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let value = serde_json::to_string(entry)?;
        sqlx::query(
            "INSERT INTO feed_cache (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(CACHE_KEY)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete the entry. Idempotent; returns whether the delete ran.
    pub async fn clear(&self) -> bool {
        let result = sqlx::query("DELETE FROM feed_cache WHERE key = ?")
            .bind(CACHE_KEY)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => {
                tracing::debug!(removed = done.rows_affected(), "Cache cleared");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to clear cache entry");
                false
            }
        }
    }
}
