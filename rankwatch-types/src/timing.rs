//! Timing snapshot - a participant's cumulative scoped-timing counters.

use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::{MetricFamily, Rank, SchemaVersion};

/// Cumulative time spent under one timing key.
///
/// Every completed interval adds its elapsed seconds to `total_secs` and
/// increments `count` by one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DurationEntry {
    /// Cumulative elapsed time in seconds.
    pub total_secs: f64,

    /// Number of completed intervals.
    pub count: u64,
}

impl DurationEntry {
    /// Create an entry with a given total and count.
    pub const fn new(total_secs: f64, count: u64) -> Self {
        Self { total_secs, count }
    }

    /// Add one completed interval.
    pub fn record(&mut self, elapsed_secs: f64) {
        self.total_secs += elapsed_secs;
        self.count += 1;
    }

    /// Mean seconds per interval, if any interval completed.
    pub fn mean_secs(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total_secs / self.count as f64)
    }
}

/// A frozen copy of one participant's timing counters.
///
/// Created once per checkpoint; later recording does not change it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingSnapshot {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    /// Rank of the participant that produced this snapshot.
    pub rank: Rank,

    /// Unix timestamp in milliseconds when this snapshot was taken.
    pub timestamp_ms: u64,

    /// Timing entries, keyed by timing key.
    pub entries: BTreeMap<String, DurationEntry>,
}

impl TimingSnapshot {
    /// The family this snapshot is published under.
    pub const FAMILY: MetricFamily = MetricFamily::Duration;

    /// Create an empty snapshot with a specific timestamp.
    pub fn with_timestamp(rank: Rank, timestamp_ms: u64) -> Self {
        Self {
            version: SchemaVersion::current(),
            rank,
            timestamp_ms,
            entries: BTreeMap::new(),
        }
    }

    /// Create a builder for constructing snapshots.
    pub fn builder(rank: Rank) -> TimingSnapshotBuilder {
        TimingSnapshotBuilder::new(rank)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Get the entry for a timing key.
    pub fn get(&self, key: &str) -> Option<&DurationEntry> {
        self.entries.get(key)
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DurationEntry)> {
        self.entries.iter()
    }

    /// Sum of all cumulative durations.
    pub fn total_secs(&self) -> f64 {
        self.entries.values().map(|e| e.total_secs).sum()
    }
}

/// Builder for `TimingSnapshot`, mostly used to fabricate peers in tests.
#[derive(Debug)]
pub struct TimingSnapshotBuilder {
    rank: Rank,
    timestamp_ms: Option<u64>,
    entries: BTreeMap<String, DurationEntry>,
}

impl TimingSnapshotBuilder {
    pub fn new(rank: Rank) -> Self {
        Self {
            rank,
            timestamp_ms: None,
            entries: BTreeMap::new(),
        }
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    /// Add an entry with a cumulative total and count.
    pub fn entry(mut self, key: impl Into<String>, total_secs: f64, count: u64) -> Self {
        self.entries
            .insert(key.into(), DurationEntry::new(total_secs, count));
        self
    }

    #[cfg(feature = "std")]
    pub fn build(self) -> TimingSnapshot {
        TimingSnapshot {
            version: SchemaVersion::current(),
            rank: self.rank,
            timestamp_ms: self
                .timestamp_ms
                .unwrap_or_else(crate::current_timestamp_ms),
            entries: self.entries,
        }
    }

    #[cfg(not(feature = "std"))]
    pub fn build(self) -> TimingSnapshot {
        TimingSnapshot {
            version: SchemaVersion::current(),
            rank: self.rank,
            timestamp_ms: self.timestamp_ms.unwrap_or(0),
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_adds_time_and_count() {
        let mut entry = DurationEntry::default();
        entry.record(0.5);
        entry.record(1.5);

        assert_eq!(entry.count, 2);
        assert!((entry.total_secs - 2.0).abs() < f64::EPSILON);
        assert_eq!(entry.mean_secs(), Some(1.0));
    }

    #[test]
    fn empty_entry_has_no_mean() {
        assert_eq!(DurationEntry::default().mean_secs(), None);
    }

    #[test]
    fn builder_collects_entries() {
        let snapshot = TimingSnapshot::builder(2)
            .timestamp_ms(1703160000000)
            .entry("forward", 10.0, 5)
            .entry("forward-spmm", 4.0, 5)
            .build();

        assert_eq!(snapshot.rank, 2);
        assert_eq!(snapshot.timestamp_ms, 1703160000000);
        assert_eq!(snapshot.len(), 2);
        assert!((snapshot.total_secs() - 14.0).abs() < f64::EPSILON);
        assert!(snapshot.version.is_compatible());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_preserves_entries() {
        let snapshot = TimingSnapshot::builder(1)
            .timestamp_ms(1)
            .entry("epoch", 3.25, 2)
            .build();

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"total_secs\":3.25"));

        let parsed: TimingSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, parsed);
    }
}
