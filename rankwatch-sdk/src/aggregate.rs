//! Checkpoint aggregation: publish, meet at the barrier, and let the
//! coordinator build the cross-rank report.

use std::sync::Arc;

use rankwatch_types::{ResourceSnapshot, TimingSnapshot};

use crate::error::{AggregateError, MembershipError};
use crate::membership::Membership;
use crate::monitor::ResourceMonitor;
use crate::output::{Output, ParticipantSnapshot};
use crate::recorder::Recorder;
use crate::report::{ResourceReport, TimingReport};
use crate::store::{BarrierOutcome, BarrierWait, CoordinationStore};

/// What to do when a timed barrier wait expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Return [`AggregateError::BarrierTimedOut`].
    #[default]
    Fail,
    /// Log and carry on with whatever snapshots are available.
    Degrade,
}

/// Runs a checkpoint on one participant.
///
/// Every participant calls the same method at the same checkpoint. Each
/// publishes its snapshot, then waits at the barrier; afterwards only the
/// coordinator (rank 0) reads the snapshots and returns a report. Everyone
/// else gets `Ok(None)`.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use rankwatch_sdk::{Aggregator, MemoryStore, Membership, Recorder};
///
/// let recorder = Recorder::new();
/// recorder.time("forward", || ());
///
/// let aggregator = Aggregator::builder(Membership::single(), Arc::new(MemoryStore::new(1)))
///     .build()
///     .unwrap();
/// let report = aggregator.aggregate(&recorder).unwrap().unwrap();
/// assert_eq!(report.row("forward").unwrap().count, 1);
/// ```
#[derive(Debug, Clone)]
pub struct Aggregator {
    membership: Membership,
    store: Arc<dyn CoordinationStore>,
    output: Output,
    wait: BarrierWait,
    on_timeout: TimeoutPolicy,
}

impl Aggregator {
    /// Create a builder. Snapshots go through `store` unless an output is set.
    pub fn builder(membership: Membership, store: Arc<dyn CoordinationStore>) -> AggregatorBuilder {
        AggregatorBuilder::new(membership, store)
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Aggregate cumulative durations across ranks.
    ///
    /// The coordinator's own keys drive the report. Returns `Ok(None)` on
    /// every other rank, and on the coordinator when no snapshot could be
    /// read at all.
    pub fn aggregate(&self, recorder: &Recorder) -> Result<Option<TimingReport>, AggregateError> {
        let local = recorder.snapshot(self.membership.rank());
        if !self.checkpoint(&local)? {
            return Ok(None);
        }

        let found = self.collect::<TimingSnapshot>();
        let report = TimingReport::from_snapshots(&local, &found);
        match &report {
            Some(r) => tracing::info!(
                participants = r.participants,
                keys = r.rows.len(),
                "aggregated timers"
            ),
            None => tracing::warn!("no timer snapshots found"),
        }
        Ok(report)
    }

    /// Aggregate memory samples across ranks.
    ///
    /// Returns `Ok(None)` on non-coordinators, and on the coordinator when
    /// no snapshot could be read.
    pub fn aggregate_resources(
        &self,
        monitor: &ResourceMonitor,
    ) -> Result<Option<ResourceReport>, AggregateError> {
        let local = ResourceSnapshot::new(self.membership.rank(), monitor.samples());
        if !self.checkpoint(&local)? {
            return Ok(None);
        }

        let gathered = self
            .output
            .gather::<ResourceSnapshot>(self.membership.world_size());
        let report = ResourceReport::from_snapshots(gathered);
        if report.is_none() {
            tracing::warn!("no memory snapshots found");
        }
        Ok(report)
    }

    /// Publish, wait at the barrier, and report whether to go on reading.
    fn checkpoint<S: ParticipantSnapshot>(&self, local: &S) -> Result<bool, AggregateError> {
        let rank = self.membership.rank();
        self.output.publish(local)?;

        let group = S::FAMILY.prefix();
        match self.store.barrier(group, self.wait)? {
            BarrierOutcome::Arrived => tracing::debug!(rank, group, "passed barrier"),
            BarrierOutcome::TimedOut => match self.on_timeout {
                TimeoutPolicy::Fail => {
                    return Err(AggregateError::BarrierTimedOut {
                        group: group.to_string(),
                    })
                }
                TimeoutPolicy::Degrade => {
                    tracing::warn!(rank, group, "barrier timed out, continuing with available snapshots")
                }
            },
        }

        Ok(self.membership.is_coordinator())
    }

    fn collect<S: ParticipantSnapshot>(&self) -> Vec<S> {
        self.output
            .gather::<S>(self.membership.world_size())
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Builder for [`Aggregator`].
#[derive(Debug)]
pub struct AggregatorBuilder {
    membership: Membership,
    store: Arc<dyn CoordinationStore>,
    output: Option<Output>,
    wait: BarrierWait,
    on_timeout: TimeoutPolicy,
}

impl AggregatorBuilder {
    pub fn new(membership: Membership, store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            membership,
            store,
            output: None,
            wait: BarrierWait::default(),
            on_timeout: TimeoutPolicy::default(),
        }
    }

    /// Publish snapshots somewhere other than the barrier's store.
    ///
    /// The destination must be readable by the coordinator, e.g. a shared
    /// directory.
    pub fn output(mut self, output: Output) -> Self {
        self.output = Some(output);
        self
    }

    /// How long to wait at the barrier. Defaults to waiting indefinitely.
    pub fn barrier_wait(mut self, wait: BarrierWait) -> Self {
        self.wait = wait;
        self
    }

    /// What a timed-out barrier does. Defaults to [`TimeoutPolicy::Fail`].
    pub fn on_timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.on_timeout = policy;
        self
    }

    /// Fails with [`MembershipError::GroupMismatch`] unless the store's
    /// barrier releases exactly `world_size` participants.
    pub fn build(self) -> Result<Aggregator, MembershipError> {
        let store = self.store.group_size();
        let world_size = self.membership.world_size();
        if store != world_size {
            return Err(MembershipError::GroupMismatch { store, world_size });
        }
        let output = self
            .output
            .unwrap_or_else(|| Output::store(self.store.clone()));
        Ok(Aggregator {
            membership: self.membership,
            store: self.store,
            output,
            wait: self.wait,
            on_timeout: self.on_timeout,
        })
    }
}
