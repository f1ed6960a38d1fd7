//! Local recorder for scoped timing intervals.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rankwatch_types::{DurationEntry, Rank, TimingSnapshot};

use crate::error::RecordError;
use crate::state::RecorderState;

/// Blocks until all work queued on the local accelerator has completed.
///
/// Timing around asynchronous device work measures dispatch latency unless
/// the device is drained at both ends of the interval.
pub trait DeviceSync: Send + Sync {
    fn synchronize(&self);
}

impl<F> DeviceSync for F
where
    F: Fn() + Send + Sync,
{
    fn synchronize(&self) {
        self()
    }
}

/// The primary interface for recording timing intervals in one participant.
///
/// A `Recorder` is a cheap handle over shared counters: clones record into
/// the same state, while separately built recorders are fully independent.
///
/// # Example
///
/// ```rust
/// use rankwatch_sdk::Recorder;
///
/// let recorder = Recorder::new();
///
/// // Explicit begin / end
/// recorder.begin_timing("epoch");
/// recorder.end_timing("epoch", &[]).unwrap();
///
/// // Scoped form, closed on every exit path
/// {
///     let _guard = recorder.timing("forward").attribute("spmm");
///     // ... work ...
/// }
///
/// assert_eq!(recorder.entry("forward").unwrap().count, 1);
/// assert_eq!(recorder.entry("forward-spmm").unwrap().count, 1);
/// ```
#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<RecorderState>,
    device: Option<Arc<dyn DeviceSync>>,
}

impl Recorder {
    /// Create a recorder without device synchronization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for configuring the recorder.
    pub fn builder() -> RecorderBuilder {
        RecorderBuilder::default()
    }

    /// Mark the start of an interval under `key`.
    ///
    /// If an interval is already open under `key`, its start is replaced.
    pub fn begin_timing(&self, key: &str) {
        self.state.begin(key, Instant::now());
    }

    /// Mark the end of the open interval under `key`.
    ///
    /// The elapsed time is added to `key` and to `key-<subkey>` for each
    /// entry of `subkeys`; every touched entry's count grows by one.
    pub fn end_timing(&self, key: &str, subkeys: &[&str]) -> Result<Duration, RecordError> {
        self.state.end(key, subkeys, Instant::now())
    }

    /// Time a scope on the host. The interval closes when the guard drops.
    pub fn timing(&self, key: &str) -> TimingGuard<'_> {
        self.begin_timing(key);
        TimingGuard {
            recorder: self,
            key: key.to_string(),
            subkeys: Vec::new(),
            device: false,
        }
    }

    /// Time a scope of device work.
    ///
    /// The configured [`DeviceSync`] runs right before the start and the
    /// stop instants are captured. Without one this behaves like
    /// [`Recorder::timing`].
    pub fn timing_device(&self, key: &str) -> TimingGuard<'_> {
        self.synchronize();
        self.begin_timing(key);
        TimingGuard {
            recorder: self,
            key: key.to_string(),
            subkeys: Vec::new(),
            device: true,
        }
    }

    /// Time a closure, returning its result.
    pub fn time<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let _guard = self.timing(key);
        f()
    }

    /// Whether an interval under `key` has begun and not yet ended.
    pub fn is_timing(&self, key: &str) -> bool {
        self.state.is_open(key)
    }

    /// Cumulative entry for a key, if any interval under it has completed.
    pub fn entry(&self, key: &str) -> Option<DurationEntry> {
        self.state.entry(key)
    }

    /// Freeze the counters into a snapshot for publication.
    pub fn snapshot(&self, rank: Rank) -> TimingSnapshot {
        self.state.collect(rank)
    }

    /// Plain-text listing of every key with its cumulative time and count.
    pub fn local_report(&self) -> String {
        let lines: Vec<String> = self
            .state
            .entries()
            .iter()
            .map(|(key, entry)| format!("{:6.2}s {:5} {}", entry.total_secs, entry.count, key))
            .collect();
        format!("{}{}", crate::report::TIMER_HEADER, lines.join("\n"))
    }

    fn synchronize(&self) {
        if let Some(device) = &self.device {
            device.synchronize();
        }
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("state", &self.state)
            .field("device_sync", &self.device.is_some())
            .finish()
    }
}

/// Builder for configuring a [`Recorder`].
#[derive(Default)]
pub struct RecorderBuilder {
    device: Option<Arc<dyn DeviceSync>>,
}

impl RecorderBuilder {
    /// Synchronization hook used by [`Recorder::timing_device`].
    pub fn device_sync(mut self, sync: impl DeviceSync + 'static) -> Self {
        self.device = Some(Arc::new(sync));
        self
    }

    pub fn build(self) -> Recorder {
        Recorder {
            state: Arc::new(RecorderState::default()),
            device: self.device,
        }
    }
}

/// Guard that closes a timing interval when dropped.
///
/// Dropping during a panic still records the interval.
#[must_use = "the interval closes as soon as the guard is dropped"]
pub struct TimingGuard<'a> {
    recorder: &'a Recorder,
    key: String,
    subkeys: Vec<String>,
    device: bool,
}

impl TimingGuard<'_> {
    /// Also attribute the interval to `key-<subkey>`.
    pub fn attribute(mut self, subkey: impl Into<String>) -> Self {
        self.subkeys.push(subkey.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        if self.device {
            self.recorder.synchronize();
        }
        let subkeys: Vec<&str> = self.subkeys.iter().map(String::as_str).collect();
        if let Err(e) = self.recorder.end_timing(&self.key, &subkeys) {
            tracing::warn!(key = %self.key, error = %e, "timing interval was already closed");
        }
    }
}
