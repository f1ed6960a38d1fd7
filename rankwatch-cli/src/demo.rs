//! A self-contained multi-rank run: one thread per rank over a shared
//! in-memory store, with synthetic work and memory readings.
//!
//! Snapshots land in a directory, so the offline commands can be tried on
//! the demo's output afterwards.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rankwatch_sdk::{
    Aggregator, BarrierWait, DeviceReading, Membership, MemoryStore, Output, QueryError, Recorder,
    ResourceMonitor, ResourceReport, TimingReport,
};

const DEVICE_TOTAL_MB: u64 = 16384;

/// Shape of a demo run.
#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub world_size: usize,
    pub steps: usize,
    /// Base duration of one forward pass; rank `r` takes `r + 1` times this.
    pub step_time: Duration,
    pub snapshot_dir: PathBuf,
    pub barrier_timeout: Duration,
}

/// Reports returned by the coordinator.
#[derive(Debug)]
pub struct DemoOutcome {
    pub timers: Option<TimingReport>,
    pub resources: Option<ResourceReport>,
}

/// Run every rank to completion and return rank 0's reports.
pub fn run(options: &DemoOptions) -> Result<DemoOutcome> {
    let store = MemoryStore::new(options.world_size);

    let handles: Vec<_> = (0..options.world_size)
        .map(|rank| {
            let store = store.clone();
            let options = options.clone();
            thread::Builder::new()
                .name(format!("rank-{}", rank))
                .spawn(move || run_rank(rank, store, &options))
        })
        .collect::<std::io::Result<_>>()?;

    let mut outcome = None;
    for (rank, handle) in handles.into_iter().enumerate() {
        let result = handle
            .join()
            .map_err(|_| anyhow!("rank {} panicked", rank))??;
        if rank == 0 {
            outcome = Some(result);
        }
    }
    outcome.ok_or_else(|| anyhow!("no rank ran"))
}

fn run_rank(rank: usize, store: MemoryStore, options: &DemoOptions) -> Result<DemoOutcome> {
    let membership = Membership::new(rank, options.world_size)?;
    let recorder = Recorder::new();
    let monitor = ResourceMonitor::builder(rank)
        .query(synthetic_device(rank))
        .build();

    for _ in 0..options.steps {
        let _epoch = recorder.timing("epoch");

        recorder.begin_timing("forward");
        thread::sleep(options.step_time * (rank as u32 + 1));
        recorder.end_timing("forward", &["spmm"])?;

        recorder.time("backward", || thread::sleep(options.step_time));
        monitor.sample_resource_usage();
    }
    tracing::debug!(rank, report = %recorder.local_report(), "rank finished");

    let aggregator = Aggregator::builder(membership, Arc::new(store))
        .output(Output::directory(&options.snapshot_dir))
        .barrier_wait(BarrierWait::Timeout(options.barrier_timeout))
        .build()?;

    Ok(DemoOutcome {
        timers: aggregator.aggregate(&recorder)?,
        resources: aggregator.aggregate_resources(&monitor)?,
    })
}

/// Memory use that grows with every reading, higher on later ranks.
fn synthetic_device(rank: usize) -> impl Fn() -> Result<DeviceReading, QueryError> + Send + Sync {
    let readings = AtomicU64::new(0);
    move || {
        let n = readings.fetch_add(1, Ordering::Relaxed);
        Ok(DeviceReading {
            used_mb: (1024 * (rank as u64 + 1) + 64 * n).min(DEVICE_TOTAL_MB),
            total_mb: DEVICE_TOTAL_MB,
        })
    }
}
