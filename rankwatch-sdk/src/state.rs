//! Internal state management for timing collection.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rankwatch_types::{DurationEntry, Rank, TimingSnapshot};

use crate::error::RecordError;

#[derive(Debug, Default)]
struct TimerState {
    /// Start instants of intervals that have begun but not ended.
    open: HashMap<String, Instant>,
    entries: BTreeMap<String, DurationEntry>,
}

/// Timing counters owned by one recorder.
///
/// Open intervals and cumulative entries live behind a single lock so an
/// interval's close and its attribution to every bucket happen together.
#[derive(Debug, Default)]
pub struct RecorderState {
    inner: Mutex<TimerState>,
}

impl RecorderState {
    /// Open an interval for `key`, replacing any interval already open.
    pub fn begin(&self, key: &str, at: Instant) {
        self.inner.lock().open.insert(key.to_string(), at);
    }

    /// Close the interval for `key` and attribute its elapsed time to `key`
    /// and to `key-<subkey>` for each subkey.
    pub fn end(&self, key: &str, subkeys: &[&str], at: Instant) -> Result<Duration, RecordError> {
        let mut inner = self.inner.lock();
        let started = inner
            .open
            .remove(key)
            .ok_or_else(|| RecordError::NotStarted(key.to_string()))?;

        let elapsed = at.saturating_duration_since(started);
        let secs = elapsed.as_secs_f64();

        inner.entries.entry(key.to_string()).or_default().record(secs);
        for subkey in subkeys {
            inner
                .entries
                .entry(format!("{}-{}", key, subkey))
                .or_default()
                .record(secs);
        }

        Ok(elapsed)
    }

    /// Whether an interval is currently open for `key`.
    pub fn is_open(&self, key: &str) -> bool {
        self.inner.lock().open.contains_key(key)
    }

    pub fn entry(&self, key: &str) -> Option<DurationEntry> {
        self.inner.lock().entries.get(key).copied()
    }

    /// Copy of every cumulative entry.
    pub fn entries(&self) -> BTreeMap<String, DurationEntry> {
        self.inner.lock().entries.clone()
    }

    /// Freeze the current counters into a snapshot tagged with `rank`.
    pub fn collect(&self, rank: Rank) -> TimingSnapshot {
        let mut snapshot =
            TimingSnapshot::with_timestamp(rank, rankwatch_types::current_timestamp_ms());
        snapshot.entries = self.entries();
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn end_without_begin_is_rejected() {
        let state = RecorderState::default();
        let err = state.end("forward", &[], Instant::now()).unwrap_err();
        assert_eq!(err, RecordError::NotStarted("forward".to_string()));
        assert!(state.entry("forward").is_none());
    }

    #[test]
    fn end_closes_the_interval() {
        let state = RecorderState::default();
        let t0 = Instant::now();

        state.begin("epoch", t0);
        assert!(state.is_open("epoch"));

        state.end("epoch", &[], t0 + Duration::from_millis(250)).unwrap();
        assert!(!state.is_open("epoch"));

        let entry = state.entry("epoch").unwrap();
        assert_eq!(entry.count, 1);
        assert!((entry.total_secs - 0.25).abs() < 1e-9);

        // A second end has nothing to close
        assert!(state.end("epoch", &[], Instant::now()).is_err());
        assert_eq!(state.entry("epoch").unwrap().count, 1);
    }

    #[test]
    fn subkeys_receive_same_delta() {
        let state = RecorderState::default();
        let t0 = Instant::now();

        state.begin("forward", t0);
        state
            .end("forward", &["a", "b"], t0 + Duration::from_millis(500))
            .unwrap();

        for key in ["forward", "forward-a", "forward-b"] {
            let entry = state.entry(key).unwrap();
            assert_eq!(entry.count, 1, "{}", key);
            assert!((entry.total_secs - 0.5).abs() < 1e-9, "{}", key);
        }
    }

    #[test]
    fn last_begin_wins() {
        let state = RecorderState::default();
        let t0 = Instant::now();

        state.begin("step", t0);
        state.begin("step", t0 + Duration::from_secs(1));
        state.end("step", &[], t0 + Duration::from_secs(3)).unwrap();

        let entry = state.entry("step").unwrap();
        assert_eq!(entry.count, 1);
        assert!((entry.total_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn collect_is_a_frozen_copy() {
        let state = RecorderState::default();
        let t0 = Instant::now();

        state.begin("k", t0);
        state.end("k", &[], t0 + Duration::from_secs(1)).unwrap();
        let snapshot = state.collect(3);

        state.begin("k", t0);
        state.end("k", &[], t0 + Duration::from_secs(1)).unwrap();

        assert_eq!(snapshot.rank, 3);
        assert_eq!(snapshot.get("k").unwrap().count, 1);
        assert_eq!(state.entry("k").unwrap().count, 2);
    }

    #[test]
    fn concurrent_intervals_on_distinct_keys() {
        use std::thread;

        let state = Arc::new(RecorderState::default());
        let mut handles = vec![];
        for i in 0..8 {
            let s = state.clone();
            handles.push(thread::spawn(move || {
                let key = format!("worker-{}", i);
                for _ in 0..100 {
                    s.begin(&key, Instant::now());
                    s.end(&key, &["total"], Instant::now()).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..8 {
            assert_eq!(state.entry(&format!("worker-{}", i)).unwrap().count, 100);
            assert_eq!(state.entry(&format!("worker-{}-total", i)).unwrap().count, 100);
        }
    }
}
