//! Age classification for cache entries.
//!
//! Pure arithmetic against two fixed thresholds; the coordinator maps
//! the class onto its serve/revalidate/refetch decision.

use std::time::Duration;

/// Entries younger than this are served without side effects.
pub const STALE_THRESHOLD: Duration = Duration::from_secs(15 * 60);

/// Entries at least this old are refetched before serving.
pub const EXPIRE_THRESHOLD: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// age < 15 minutes
    Fresh,
    /// 15 minutes <= age < 30 minutes
    Stale,
    /// age >= 30 minutes
    Expired,
}

/// Classification plus the measured age, for response metadata and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeReport {
    pub class: Freshness,
    pub age_ms: u64,
    pub age_minutes: u64,
}

/// Classify an entry timestamp against `now` (both epoch milliseconds).
///
/// A timestamp in the future (clock skew between writer and reader)
/// clamps to age zero rather than going negative.
pub fn classify(timestamp_ms: i64, now_ms: i64) -> AgeReport {
    let age_ms = now_ms.saturating_sub(timestamp_ms).max(0) as u64;

    let class = if age_ms < STALE_THRESHOLD.as_millis() as u64 {
        Freshness::Fresh
    } else if age_ms < EXPIRE_THRESHOLD.as_millis() as u64 {
        Freshness::Stale
    } else {
        Freshness::Expired
    };

    AgeReport {
        class,
        age_ms,
        age_minutes: age_ms / 60_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE_MS: i64 = 60_000;

    fn class_at(age_minutes: i64) -> Freshness {
        let now = 1_700_000_000_000;
        classify(now - age_minutes * MINUTE_MS, now).class
    }

    #[test]
    fn test_age_zero_is_fresh() {
        assert_eq!(class_at(0), Freshness::Fresh);
    }

    #[test]
    fn test_mid_band_values() {
        assert_eq!(class_at(10), Freshness::Fresh);
        assert_eq!(class_at(20), Freshness::Stale);
        assert_eq!(class_at(40), Freshness::Expired);
    }

    #[test]
    fn test_boundary_fifteen_minutes_is_stale() {
        assert_eq!(class_at(15), Freshness::Stale);
    }

    #[test]
    fn test_boundary_thirty_minutes_is_expired() {
        assert_eq!(class_at(30), Freshness::Expired);
    }

    #[test]
    fn test_future_timestamp_clamps_to_zero_age() {
        let now = 1_700_000_000_000;
        let report = classify(now + 5 * MINUTE_MS, now);
        assert_eq!(report.class, Freshness::Fresh);
        assert_eq!(report.age_ms, 0);
        assert_eq!(report.age_minutes, 0);
    }

    #[test]
    fn test_reports_age_in_both_units() {
        let now = 1_700_000_000_000;
        let report = classify(now - 20 * MINUTE_MS - 30_000, now);
        assert_eq!(report.age_ms, 20 * 60_000 + 30_000);
        assert_eq!(report.age_minutes, 20);
    }

    #[test]
    fn test_classification_is_pure() {
        let now = 1_700_000_000_000;
        let ts = now - 20 * MINUTE_MS;
        assert_eq!(classify(ts, now), classify(ts, now));
    }
}
