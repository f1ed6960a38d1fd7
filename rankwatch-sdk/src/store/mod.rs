//! Coordination store abstraction for exchanging snapshots between ranks.
//!
//! A store is a key-value medium every participant can reach, plus a group
//! barrier. Data keys are rank-scoped, so each key has exactly one writer;
//! the barrier's arrival count is the only state participants mutate
//! concurrently, and every implementation updates it atomically.
//!
//! Barrier arrivals are numbered tickets. The participant holding ticket `t`
//! in a group of `n` is released once `(t / n + 1) * n` tickets exist, so
//! the same group id can be reused for successive checkpoints.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::fmt::Debug;
use std::time::Duration;

use crate::error::StoreError;

/// How long a participant waits at a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarrierWait {
    /// Block until every participant arrives, however long that takes.
    #[default]
    Indefinite,
    /// Give up after the duration.
    Timeout(Duration),
}

/// Result of waiting at a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// Every participant arrived.
    Arrived,
    /// The wait ended before every participant arrived.
    ///
    /// The caller's arrival still counts; there is no protocol for
    /// withdrawing it.
    TimedOut,
}

/// Trait for shared key-value media with a group barrier.
///
/// # Example
///
/// ```
/// use rankwatch_sdk::{BarrierOutcome, BarrierWait, CoordinationStore, MemoryStore};
///
/// let store = MemoryStore::new(1);
/// store.put("duration_dict_0", b"{}").unwrap();
/// assert_eq!(store.get("duration_dict_0").unwrap(), b"{}");
/// assert_eq!(
///     store.barrier("checkpoint", BarrierWait::Indefinite).unwrap(),
///     BarrierOutcome::Arrived
/// );
/// ```
pub trait CoordinationStore: Send + Sync + Debug {
    /// Upsert a blob under `key`. Racing writers: last one wins.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Read the blob under `key`, or [`StoreError::NotFound`].
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Block until every participant of the group has called `barrier` with
    /// the same `group` id. All participants are released together.
    fn barrier(&self, group: &str, wait: BarrierWait) -> Result<BarrierOutcome, StoreError>;

    /// Number of participants the barrier waits for.
    fn group_size(&self) -> usize;

    /// Human-readable description of the store, for logs.
    fn description(&self) -> &str;
}

/// Ticket count at which the holder of `ticket` is released.
pub(crate) fn release_target(ticket: u64, group_size: usize) -> u64 {
    let n = group_size as u64;
    (ticket / n + 1) * n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_target_rounds_up_to_generation() {
        assert_eq!(release_target(0, 3), 3);
        assert_eq!(release_target(2, 3), 3);
        assert_eq!(release_target(3, 3), 6);
        assert_eq!(release_target(0, 1), 1);
        assert_eq!(release_target(5, 1), 6);
    }
}
