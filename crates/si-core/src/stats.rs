//! Run statistics with atomic counters.
//!
//! [`RunStats`] lives inside the [`RunContext`](crate::RunContext) and is
//! incremented from the sorter's parallel header reads as well as from the
//! sequential naming and conversion stages. [`StatsSnapshot`] is the
//! serializable point-in-time view reported at the end of a run.
//!
//! Counters use [`Relaxed`](std::sync::atomic::Ordering::Relaxed) ordering;
//! they are informational and never used for synchronization.
//!
//! # Examples
//!
//! ```
//! use si_core::RunStats;
//!
//! let stats = RunStats::new();
//! stats.file_seen();
//! stats.file_seen();
//! stats.file_skipped();
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.files_seen, 2);
//! assert_eq!(snapshot.files_skipped, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for one pipeline run.
#[derive(Debug, Default)]
pub struct RunStats {
    files_seen: AtomicU64,
    files_skipped: AtomicU64,
    series_found: AtomicU64,
    duplicates_removed: AtomicU64,
    records_named: AtomicU64,
    records_excluded: AtomicU64,
    groups_converted: AtomicU64,
    groups_failed: AtomicU64,
}

impl RunStats {
    /// Creates a new [`RunStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one raw file visited by the sorter.
    #[inline]
    pub fn file_seen(&self) {
        self.files_seen.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one raw file dropped as unreadable or unsupported.
    #[inline]
    pub fn file_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts `n` series directories produced by the sorter.
    #[inline]
    pub fn series_found(&self, n: u64) {
        self.series_found.fetch_add(n, Ordering::Relaxed);
    }

    /// Counts one duplicate instance removed.
    #[inline]
    pub fn duplicate_removed(&self) {
        self.duplicates_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one record that received a final name.
    #[inline]
    pub fn record_named(&self) {
        self.records_named.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one record excluded from conversion.
    #[inline]
    pub fn record_excluded(&self) {
        self.records_excluded.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one converter group that produced all its outputs.
    #[inline]
    pub fn group_converted(&self) {
        self.groups_converted.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one converter group that failed.
    #[inline]
    pub fn group_failed(&self) {
        self.groups_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_seen: self.files_seen.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            series_found: self.series_found.load(Ordering::Relaxed),
            duplicates_removed: self.duplicates_removed.load(Ordering::Relaxed),
            records_named: self.records_named.load(Ordering::Relaxed),
            records_excluded: self.records_excluded.load(Ordering::Relaxed),
            groups_converted: self.groups_converted.load(Ordering::Relaxed),
            groups_failed: self.groups_failed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Raw files visited by the sorter.
    pub files_seen: u64,
    /// Raw files dropped as unreadable or unsupported.
    pub files_skipped: u64,
    /// Series directories produced by the sorter.
    pub series_found: u64,
    /// Duplicate instances removed.
    pub duplicates_removed: u64,
    /// Records that received a final name.
    pub records_named: u64,
    /// Records excluded from conversion.
    pub records_excluded: u64,
    /// Converter groups that succeeded.
    pub groups_converted: u64,
    /// Converter groups that failed.
    pub groups_failed: u64,
}

impl StatsSnapshot {
    /// Returns the share of raw files that were usable, as a percentage.
    ///
    /// Returns 100.0 when no files were seen.
    ///
    /// # Examples
    ///
    /// ```
    /// use si_core::StatsSnapshot;
    ///
    /// let snap = StatsSnapshot {
    ///     files_seen: 200,
    ///     files_skipped: 10,
    ///     ..Default::default()
    /// };
    /// assert!((snap.usable_percent() - 95.0).abs() < 0.1);
    /// ```
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Acceptable for statistics display
    pub fn usable_percent(&self) -> f64 {
        if self.files_seen == 0 {
            return 100.0;
        }
        (self.files_seen.saturating_sub(self.files_skipped) as f64 / self.files_seen as f64)
            * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_stats_new() {
        let snap = RunStats::new().snapshot();
        assert_eq!(snap, StatsSnapshot::default());
    }

    #[test]
    fn test_run_stats_increment() {
        let stats = RunStats::new();
        stats.file_seen();
        stats.file_seen();
        stats.file_skipped();
        stats.series_found(3);
        stats.duplicate_removed();
        stats.record_named();
        stats.record_excluded();
        stats.group_converted();
        stats.group_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.files_seen, 2);
        assert_eq!(snap.files_skipped, 1);
        assert_eq!(snap.series_found, 3);
        assert_eq!(snap.duplicates_removed, 1);
        assert_eq!(snap.records_named, 1);
        assert_eq!(snap.records_excluded, 1);
        assert_eq!(snap.groups_converted, 1);
        assert_eq!(snap.groups_failed, 1);
    }

    #[test]
    fn test_usable_percent_empty() {
        let snap = StatsSnapshot::default();
        assert!((snap.usable_percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_serialization() {
        let snap = StatsSnapshot {
            files_seen: 10,
            duplicates_removed: 2,
            ..Default::default()
        };
        let json = serde_json::to_string(&snap).unwrap();
        let parsed: StatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, parsed);
    }
}
