//! Metric families and the rank-scoped keys their snapshots are stored under.

use alloc::format;
use alloc::string::String;
use core::fmt;

use crate::Rank;

/// The kind of snapshot a participant publishes.
///
/// Each family owns one key per rank, `<family>_<rank>`, used both as the
/// coordination-store key and as the file stem on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MetricFamily {
    /// Cumulative scoped-timing durations.
    Duration,
    /// Accelerator memory samples.
    GpuMemory,
}

impl MetricFamily {
    /// Prefix shared by every key of this family.
    pub const fn prefix(&self) -> &'static str {
        match self {
            MetricFamily::Duration => "duration_dict",
            MetricFamily::GpuMemory => "gpu_memory",
        }
    }

    /// Key under which `rank` publishes its snapshot for this family.
    pub fn key(&self, rank: Rank) -> String {
        format!("{}_{}", self.prefix(), rank)
    }

    /// File name for the rank's snapshot in a snapshot directory.
    pub fn file_name(&self, rank: Rank) -> String {
        format!("{}.json", self.key(rank))
    }

    /// Parse the rank back out of a key produced by [`MetricFamily::key`].
    pub fn rank_of(&self, key: &str) -> Option<Rank> {
        key.strip_prefix(self.prefix())?
            .strip_prefix('_')?
            .parse()
            .ok()
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}
