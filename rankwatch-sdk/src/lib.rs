//! # rankwatch-sdk
//!
//! Timing and GPU memory recording for distributed runs, with a
//! coordinator that aggregates every rank's numbers at a checkpoint.
//!
//! Each participant keeps a [`Recorder`] (and optionally a
//! [`ResourceMonitor`]). At a checkpoint every participant hands its
//! recorder to an [`Aggregator`], which publishes a snapshot, waits at a
//! barrier on the shared [`CoordinationStore`], and on rank 0 returns a
//! report with the mean and sample standard deviation of each key.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rankwatch_sdk::{Aggregator, BarrierWait, FileStore, Membership, Recorder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let membership = Membership::from_env()?;
//!     let store = FileStore::new("/shared/rankwatch/run-42", membership.world_size());
//!
//!     let recorder = Recorder::new();
//!     for _ in 0..10 {
//!         let _step = recorder.timing("step");
//!         recorder.time("forward", || { /* ... */ });
//!     }
//!
//!     let aggregator = Aggregator::builder(membership, Arc::new(store))
//!         .barrier_wait(BarrierWait::Timeout(Duration::from_secs(300)))
//!         .build()?;
//!
//!     if let Some(report) = aggregator.aggregate(&recorder)? {
//!         println!("{}", report.detail());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Scoped timing**: guards close intervals on every exit path, with
//!   optional device synchronization at both ends
//! - **Pluggable stores**: in-process [`MemoryStore`] for threads,
//!   [`FileStore`] for processes sharing a filesystem
//! - **Bounded barriers**: wait indefinitely or with a timeout
//! - **Offline reports**: snapshots written with [`Output::directory`] can be
//!   aggregated after every participant has exited

mod aggregate;
mod error;
mod membership;
mod monitor;
mod output;
mod query;
mod recorder;
mod report;
mod state;
mod store;

pub use aggregate::{Aggregator, AggregatorBuilder, TimeoutPolicy};
pub use error::{
    AggregateError, MembershipError, PersistError, QueryError, RecordError, StoreError,
};
pub use membership::{Membership, RANK_VAR, WORLD_SIZE_VAR};
#[cfg(feature = "tokio")]
pub use monitor::SamplingHandle;
pub use monitor::{ResourceMonitor, ResourceMonitorBuilder};
pub use output::{Codec, Output, ParticipantSnapshot};
pub use query::{parse_reading, DeviceReading, NoDevice, NvidiaSmi, NvidiaSmiBuilder, ResourceQuery};
pub use recorder::{DeviceSync, Recorder, RecorderBuilder, TimingGuard};
pub use report::{
    save_report, RankResources, ResourceReport, ResourceRollup, TimingReport, TimingRow,
};
pub use store::{BarrierOutcome, BarrierWait, CoordinationStore, FileStore, MemoryStore};

// Re-export types for convenience
pub use rankwatch_types::{
    AggregateStat, DurationEntry, MetricFamily, Rank, ResourceSample, ResourceSnapshot,
    ResourceSummary, SchemaVersion, TimingSnapshot,
};
