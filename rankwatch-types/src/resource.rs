//! Resource samples - a participant's accelerator memory time series.

use alloc::vec::Vec;

use crate::{MetricFamily, Rank, SchemaVersion};

/// A point-in-time reading of accelerator memory.
///
/// `percent` is derived from `used_mb / total_mb * 100` at construction
/// and never recomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceSample {
    /// Unix timestamp in milliseconds when the reading was taken.
    pub timestamp_ms: u64,

    /// Memory in use, in megabytes.
    pub used_mb: u64,

    /// Total device memory, in megabytes.
    pub total_mb: u64,

    /// Utilization percentage.
    pub percent: f64,
}

impl ResourceSample {
    /// Build a sample from a raw reading.
    ///
    /// Returns `None` when `total_mb` is zero, since no percentage exists.
    pub fn new(timestamp_ms: u64, used_mb: u64, total_mb: u64) -> Option<Self> {
        if total_mb == 0 {
            return None;
        }
        Some(Self {
            timestamp_ms,
            used_mb,
            total_mb,
            percent: used_mb as f64 / total_mb as f64 * 100.0,
        })
    }
}

/// A frozen copy of one participant's resource samples, in recording order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceSnapshot {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    /// Rank of the participant that produced this snapshot.
    pub rank: Rank,

    /// Samples ordered by creation time.
    pub samples: Vec<ResourceSample>,
}

impl ResourceSnapshot {
    /// The family this snapshot is published under.
    pub const FAMILY: MetricFamily = MetricFamily::GpuMemory;

    pub fn new(rank: Rank, samples: Vec<ResourceSample>) -> Self {
        Self {
            version: SchemaVersion::current(),
            rank,
            samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Average and peak usage over all samples, or `None` with no samples.
    pub fn summary(&self) -> Option<ResourceSummary> {
        ResourceSummary::from_samples(&self.samples)
    }
}

/// Average and peak memory usage of one participant.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceSummary {
    pub avg_percent: f64,
    pub max_percent: f64,
    pub avg_used_mb: f64,
    pub max_used_mb: u64,
    pub sample_count: usize,
}

impl ResourceSummary {
    /// Summarize a series of samples.
    pub fn from_samples(samples: &[ResourceSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;

        let avg_percent = samples.iter().map(|s| s.percent).sum::<f64>() / n;
        let avg_used_mb = samples.iter().map(|s| s.used_mb as f64).sum::<f64>() / n;
        let max_percent = samples
            .iter()
            .map(|s| s.percent)
            .fold(f64::NEG_INFINITY, f64::max);
        let max_used_mb = samples.iter().map(|s| s.used_mb).max().unwrap_or(0);

        Some(Self {
            avg_percent,
            max_percent,
            avg_used_mb,
            max_used_mb,
            sample_count: samples.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn sample_derives_percentage() {
        let sample = ResourceSample::new(0, 4096, 16384).unwrap();
        assert!((sample.percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(ResourceSample::new(0, 10, 0).is_none());
    }

    #[test]
    fn summary_tracks_average_and_peak() {
        let snapshot = ResourceSnapshot::new(
            0,
            vec![
                ResourceSample::new(1, 1000, 10000).unwrap(),
                ResourceSample::new(2, 3000, 10000).unwrap(),
                ResourceSample::new(3, 2000, 10000).unwrap(),
            ],
        );

        let summary = snapshot.summary().unwrap();
        assert_eq!(summary.sample_count, 3);
        assert!((summary.avg_percent - 20.0).abs() < 1e-9);
        assert!((summary.max_percent - 30.0).abs() < 1e-9);
        assert!((summary.avg_used_mb - 2000.0).abs() < 1e-9);
        assert_eq!(summary.max_used_mb, 3000);
    }

    #[test]
    fn empty_snapshot_has_no_summary() {
        assert!(ResourceSnapshot::new(1, Vec::new()).summary().is_none());
    }
}
