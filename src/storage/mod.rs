mod cache;
mod freshness;

pub use cache::{CacheEntry, CacheError, CacheStore};
pub use freshness::{classify, AgeReport, Freshness, EXPIRE_THRESHOLD, STALE_THRESHOLD};
