//! Cross-rank reports and their text rendering.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rankwatch_types::{AggregateStat, Rank, ResourceSnapshot, ResourceSummary, TimingSnapshot};
use serde::Serialize;

pub(crate) const TIMER_HEADER: &str = "\ntimer summary:\n";
const DETAIL_SEPARATOR: &str = "--------------";
const RULE_WIDTH: usize = 60;

/// One key of a [`TimingReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingRow {
    pub key: String,
    pub stat: AggregateStat,
    /// Completed intervals on the reference participant.
    pub count: u64,
}

/// Cumulative durations aggregated across ranks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingReport {
    pub rows: Vec<TimingRow>,
    /// Number of snapshots that went into the report.
    pub participants: usize,
}

impl TimingReport {
    /// Build a report over `snapshots`, driven by the key set of `reference`.
    ///
    /// Each key of `reference` collects its cumulative duration from every
    /// snapshot that contains it; snapshots lacking the key are skipped for
    /// that key, and keys only other ranks recorded are ignored. Counts come
    /// from `reference`.
    ///
    /// Returns `None` when `snapshots` is empty.
    pub fn from_snapshots(reference: &TimingSnapshot, snapshots: &[TimingSnapshot]) -> Option<Self> {
        if snapshots.is_empty() {
            return None;
        }

        for snapshot in snapshots {
            let missing = reference
                .entries
                .keys()
                .filter(|k| !snapshot.entries.contains_key(*k))
                .count();
            let extra = snapshot
                .entries
                .keys()
                .filter(|k| !reference.entries.contains_key(*k))
                .count();
            if missing > 0 || extra > 0 {
                tracing::debug!(
                    rank = snapshot.rank,
                    missing,
                    extra,
                    "key set differs from reference"
                );
            }
        }

        let rows = reference
            .iter()
            .filter_map(|(key, entry)| {
                let values = snapshots
                    .iter()
                    .filter_map(|s| s.get(key).map(|e| e.total_secs))
                    .collect();
                AggregateStat::from_values(values).map(|stat| TimingRow {
                    key: key.clone(),
                    stat,
                    count: entry.count,
                })
            })
            .collect();

        Some(Self {
            rows,
            participants: snapshots.len(),
        })
    }

    /// Look up a row by key.
    pub fn row(&self, key: &str) -> Option<&TimingRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    /// Mean, deviation, count and key per line.
    pub fn summary(&self) -> String {
        let lines: Vec<String> = self
            .rows
            .iter()
            .map(|r| {
                format!(
                    "{:6.2}s {:6.2}s {:5} {}",
                    r.stat.mean, r.stat.std_dev, r.count, r.key
                )
            })
            .collect();
        format!("{}{}", TIMER_HEADER, lines.join("\n"))
    }

    /// Summary lines each followed by every rank's value.
    pub fn detail(&self) -> String {
        let blocks: Vec<String> = self
            .rows
            .iter()
            .map(|r| {
                let values: Vec<String> = r.stat.values.iter().map(|v| format!("{:6.2}", v)).collect();
                format!(
                    "{:6.2}s {:6.2}s {:5} {} \ndetail: {} \n{}",
                    r.stat.mean,
                    r.stat.std_dev,
                    r.count,
                    r.key,
                    values.join(" "),
                    DETAIL_SEPARATOR
                )
            })
            .collect();
        format!("{}{}", TIMER_HEADER, blocks.join("\n"))
    }
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Memory usage of one rank, `None` when it has no samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankResources {
    pub rank: Rank,
    pub summary: Option<ResourceSummary>,
}

/// Usage across every rank that reported samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceRollup {
    /// Mean of the per-rank average percentages.
    pub avg_percent: f64,
    /// Highest per-rank peak percentage.
    pub max_percent: f64,
    pub avg_used_mb: f64,
    pub max_used_mb: u64,
}

impl ResourceRollup {
    fn from_summaries<'a>(summaries: impl IntoIterator<Item = &'a ResourceSummary>) -> Option<Self> {
        let summaries: Vec<&ResourceSummary> = summaries.into_iter().collect();
        if summaries.is_empty() {
            return None;
        }
        let n = summaries.len() as f64;
        Some(Self {
            avg_percent: summaries.iter().map(|s| s.avg_percent).sum::<f64>() / n,
            max_percent: summaries
                .iter()
                .map(|s| s.max_percent)
                .fold(f64::NEG_INFINITY, f64::max),
            avg_used_mb: summaries.iter().map(|s| s.avg_used_mb).sum::<f64>() / n,
            max_used_mb: summaries.iter().map(|s| s.max_used_mb).max().unwrap_or(0),
        })
    }
}

/// Memory usage aggregated across ranks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceReport {
    /// One entry per rank slot, in rank order.
    pub ranks: Vec<RankResources>,
    /// `None` when no rank reported a sample.
    pub global: Option<ResourceRollup>,
}

impl ResourceReport {
    /// Build a report from the result of a gather, indexed by rank.
    ///
    /// Missing snapshots and snapshots without samples both show as
    /// "No data". Returns `None` when no snapshot was found at all.
    pub fn from_snapshots(gathered: Vec<Option<ResourceSnapshot>>) -> Option<Self> {
        if gathered.iter().all(Option::is_none) {
            return None;
        }

        let ranks: Vec<RankResources> = gathered
            .iter()
            .enumerate()
            .map(|(rank, snapshot)| RankResources {
                rank: snapshot.as_ref().map_or(rank, |s| s.rank),
                summary: snapshot.as_ref().and_then(ResourceSnapshot::summary),
            })
            .collect();
        let global = ResourceRollup::from_summaries(ranks.iter().filter_map(|r| r.summary.as_ref()));

        Some(Self { ranks, global })
    }

    pub fn rank(&self, rank: Rank) -> Option<&RankResources> {
        self.ranks.iter().find(|r| r.rank == rank)
    }

    /// Global rollup followed by one line per rank.
    pub fn summary(&self) -> String {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);

        let mut out = String::from("\nGPU Memory Summary:\n");
        out.push_str(&heavy);
        out.push('\n');
        match &self.global {
            Some(g) => {
                out.push_str(&format!("Global average utilization: {:.1}%\n", g.avg_percent));
                out.push_str(&format!("Global peak utilization: {:.1}%\n", g.max_percent));
                out.push_str(&format!("Global average used: {:.1} MB\n", g.avg_used_mb));
                out.push_str(&format!("Global peak used: {:.1} MB\n", g.max_used_mb as f64));
            }
            None => out.push_str("Global: No data\n"),
        }
        out.push_str(&light);
        out.push('\n');

        let lines: Vec<String> = self.ranks.iter().map(render_rank).collect();
        out.push_str(&lines.join("\n"));
        out.push('\n');
        out.push_str(&heavy);
        out.push('\n');
        out
    }
}

impl fmt::Display for ResourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

fn render_rank(r: &RankResources) -> String {
    match &r.summary {
        Some(s) => format!(
            "Rank {}: avg {:.1}% ({:.1} MB), peak {:.1}% ({:.1} MB), samples {}",
            r.rank,
            s.avg_percent,
            s.avg_used_mb,
            s.max_percent,
            s.max_used_mb as f64,
            s.sample_count
        ),
        None => format!("Rank {}: No data", r.rank),
    }
}

/// Write `text` to `<dir>/<prefix>.txt`, creating `dir` if needed.
pub fn save_report(dir: impl AsRef<Path>, prefix: &str, text: &str) -> io::Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.txt", prefix));
    fs::write(&path, text)?;
    tracing::info!(path = %path.display(), "saved report");
    Ok(path)
}
