//! In-process store for participants running as threads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::{release_target, BarrierOutcome, BarrierWait, CoordinationStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Inner {
    data: HashMap<String, Vec<u8>>,
    /// Tickets issued so far, per barrier group.
    arrivals: HashMap<String, u64>,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    arrived: Condvar,
    group_size: usize,
}

/// A store held in memory and shared by cloning.
///
/// Every clone refers to the same data and barrier state, so a group of
/// threads can each hold one and behave like separate participants.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create a store for a group of `group_size` participants.
    ///
    /// A size of zero is treated as one.
    pub fn new(group_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                arrived: Condvar::new(),
                group_size: group_size.max(1),
            }),
        }
    }

    /// Number of data keys currently stored.
    pub fn len(&self) -> usize {
        self.shared.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CoordinationStore for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.shared
            .inner
            .lock()
            .data
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.shared
            .inner
            .lock()
            .data
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn barrier(&self, group: &str, wait: BarrierWait) -> Result<BarrierOutcome, StoreError> {
        let deadline = match wait {
            BarrierWait::Indefinite => None,
            BarrierWait::Timeout(d) => Some(Instant::now() + d),
        };

        let mut inner = self.shared.inner.lock();
        let arrivals = inner.arrivals.entry(group.to_string()).or_insert(0);
        let ticket = *arrivals;
        *arrivals += 1;
        let target = release_target(ticket, self.shared.group_size);
        tracing::debug!(group, ticket, target, "arrived at barrier");
        self.shared.arrived.notify_all();

        loop {
            let issued = inner.arrivals.get(group).copied().unwrap_or(0);
            if issued >= target {
                return Ok(BarrierOutcome::Arrived);
            }
            match deadline {
                None => self.shared.arrived.wait(&mut inner),
                Some(deadline) => {
                    if self
                        .shared
                        .arrived
                        .wait_until(&mut inner, deadline)
                        .timed_out()
                    {
                        let issued = inner.arrivals.get(group).copied().unwrap_or(0);
                        if issued >= target {
                            return Ok(BarrierOutcome::Arrived);
                        }
                        return Ok(BarrierOutcome::TimedOut);
                    }
                }
            }
        }
    }

    fn group_size(&self) -> usize {
        self.shared.group_size
    }

    fn description(&self) -> &str {
        "memory"
    }
}
