//! Aggregation over a snapshot directory after every rank has exited.

use std::fs;
use std::path::Path;

use rankwatch_sdk::{
    MetricFamily, Output, Rank, ResourceReport, ResourceSnapshot, TimingReport, TimingSnapshot,
};

/// Default report prefix for timer summaries.
pub const TIMER_PREFIX: &str = "timer_summary";

/// Default report prefix for memory summaries.
pub const GPU_PREFIX: &str = "gpu_summary";

/// Aggregate `duration_dict_<rank>.json` files for ranks `0..world_size`.
///
/// The first snapshot found supplies the key set and the counts. Missing
/// ranks are skipped; `None` means no file was found at all.
pub fn timer_summary(dir: &Path, world_size: usize) -> Option<TimingReport> {
    warn_beyond_world(dir, TimingSnapshot::FAMILY, world_size);
    let found: Vec<TimingSnapshot> = Output::directory(dir)
        .gather(world_size)
        .into_iter()
        .flatten()
        .collect();
    tracing::info!(dir = %dir.display(), found = found.len(), world_size, "read timer snapshots");

    let reference = found.first()?;
    TimingReport::from_snapshots(reference, &found)
}

/// Aggregate `gpu_memory_<rank>.json` files for ranks `0..world_size`.
///
/// Returns `None` when no file was found.
pub fn gpu_summary(dir: &Path, world_size: usize) -> Option<ResourceReport> {
    warn_beyond_world(dir, ResourceSnapshot::FAMILY, world_size);
    let gathered = Output::directory(dir).gather::<ResourceSnapshot>(world_size);
    let found = gathered.iter().filter(|s| s.is_some()).count();
    tracing::info!(dir = %dir.display(), found, world_size, "read memory snapshots");

    ResourceReport::from_snapshots(gathered)
}

/// Ranks that have a snapshot file of `family` in `dir`, ascending.
pub fn scan_ranks(dir: &Path, family: MetricFamily) -> Vec<Rank> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut ranks: Vec<Rank> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let stem = name.to_str()?.strip_suffix(".json")?;
            family.rank_of(stem)
        })
        .collect();
    ranks.sort_unstable();
    ranks
}

fn warn_beyond_world(dir: &Path, family: MetricFamily, world_size: usize) {
    let beyond: Vec<Rank> = scan_ranks(dir, family)
        .into_iter()
        .filter(|rank| *rank >= world_size)
        .collect();
    if !beyond.is_empty() {
        tracing::warn!(
            family = %family,
            world_size,
            ranks = ?beyond,
            "snapshots exist beyond the world size and are ignored"
        );
    }
}
