//! Resource monitor: a participant's accelerator memory time series.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rankwatch_types::{Rank, ResourceSample, ResourceSnapshot, ResourceSummary};

use crate::error::PersistError;
use crate::output::Output;
use crate::query::{NoDevice, ResourceQuery};

/// Records memory samples for one participant.
///
/// Sampling never fails from the caller's point of view: a query that
/// errors, times out, or reports a zero-capacity device is logged and the
/// round is skipped.
///
/// # Example
///
/// ```rust
/// use rankwatch_sdk::{DeviceReading, QueryError, ResourceMonitor};
///
/// let monitor = ResourceMonitor::builder(0)
///     .query(|| -> Result<DeviceReading, QueryError> {
///         Ok(DeviceReading { used_mb: 2048, total_mb: 8192 })
///     })
///     .build();
///
/// monitor.sample_resource_usage();
/// let summary = monitor.summary().unwrap();
/// assert_eq!(summary.sample_count, 1);
/// assert_eq!(summary.max_percent, 25.0);
/// ```
#[derive(Clone)]
pub struct ResourceMonitor {
    rank: Rank,
    samples: Arc<RwLock<Vec<ResourceSample>>>,
    query: Arc<dyn ResourceQuery>,
    interval: Duration,
}

impl ResourceMonitor {
    /// Create a builder for the participant with the given rank.
    pub fn builder(rank: Rank) -> ResourceMonitorBuilder {
        ResourceMonitorBuilder::new(rank)
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Period between background samples.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Query the device once and append a sample.
    ///
    /// Returns the recorded sample, or `None` when this round produced none.
    pub fn sample_resource_usage(&self) -> Option<ResourceSample> {
        let reading = match self.query.query() {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!(rank = self.rank, error = %e, "memory query failed, sample dropped");
                return None;
            }
        };

        let Some(sample) = ResourceSample::new(
            rankwatch_types::current_timestamp_ms(),
            reading.used_mb,
            reading.total_mb,
        ) else {
            tracing::warn!(rank = self.rank, "device reported zero total memory, sample dropped");
            return None;
        };

        self.samples.write().push(sample);
        Some(sample)
    }

    /// Copy of every sample, oldest first.
    pub fn samples(&self) -> Vec<ResourceSample> {
        self.samples.read().clone()
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze the samples into a snapshot for publication.
    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot::new(self.rank, self.samples())
    }

    /// Average and peak usage, or `None` before the first sample.
    pub fn summary(&self) -> Option<ResourceSummary> {
        ResourceSummary::from_samples(&self.samples.read())
    }

    /// Publish the current samples.
    pub fn save(&self, output: &Output) -> Result<(), PersistError> {
        let snapshot = self.snapshot();
        output.publish(&snapshot)?;
        tracing::info!(
            rank = self.rank,
            samples = snapshot.len(),
            location = %output.location::<ResourceSnapshot>(self.rank),
            "saved memory samples"
        );
        Ok(())
    }

    /// Human-readable summary of this participant's usage.
    pub fn local_summary(&self) -> String {
        render_local_summary(self.summary().as_ref())
    }

    /// Start sampling in the background at the configured interval.
    ///
    /// Each query runs on the blocking pool so a slow device command never
    /// stalls the runtime. Returns a handle that stops sampling.
    #[cfg(feature = "tokio")]
    pub fn start(&self) -> SamplingHandle {
        use tokio::sync::watch;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let monitor = self.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let m = monitor.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || m.sample_resource_usage()).await {
                            tracing::warn!(rank = monitor.rank, error = %e, "sampling task failed");
                        }
                    }
                    changed = stop_rx.changed() => {
                        // a dropped handle counts as a stop
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        SamplingHandle { stop_tx }
    }
}

impl fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("rank", &self.rank)
            .field("samples", &self.len())
            .field("interval", &self.interval)
            .finish()
    }
}

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Builder for configuring a [`ResourceMonitor`].
pub struct ResourceMonitorBuilder {
    rank: Rank,
    query: Option<Arc<dyn ResourceQuery>>,
    interval: Option<Duration>,
}

impl ResourceMonitorBuilder {
    pub fn new(rank: Rank) -> Self {
        Self {
            rank,
            query: None,
            interval: None,
        }
    }

    /// Source of memory readings, e.g. [`NvidiaSmi`](crate::NvidiaSmi).
    ///
    /// Without one every sample is dropped.
    pub fn query(mut self, query: impl ResourceQuery + 'static) -> Self {
        self.query = Some(Arc::new(query));
        self
    }

    /// Background sampling interval. Defaults to 1 second; anything below
    /// 1 millisecond is raised to 1 millisecond.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn build(self) -> ResourceMonitor {
        let mut interval = self.interval.unwrap_or(DEFAULT_INTERVAL);
        if interval < MIN_INTERVAL {
            tracing::warn!(
                rank = self.rank,
                requested = ?interval,
                "sampling interval too short, using {:?}",
                MIN_INTERVAL
            );
            interval = MIN_INTERVAL;
        }
        ResourceMonitor {
            rank: self.rank,
            samples: Arc::new(RwLock::new(Vec::new())),
            query: self.query.unwrap_or_else(|| Arc::new(NoDevice)),
            interval,
        }
    }
}

/// Handle for controlling background sampling.
///
/// Call `stop()` to end sampling; dropping the handle also ends it.
#[cfg(feature = "tokio")]
pub struct SamplingHandle {
    stop_tx: tokio::sync::watch::Sender<bool>,
}

#[cfg(feature = "tokio")]
impl SamplingHandle {
    /// Stop background sampling.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }
}

const RULE_WIDTH: usize = 60;

fn render_local_summary(summary: Option<&ResourceSummary>) -> String {
    let Some(s) = summary else {
        return "No GPU memory data".to_string();
    };
    let rule = "=".repeat(RULE_WIDTH);
    format!(
        "\n{rule}\nGPU memory usage summary (local)\n{rule}\n\
         Average utilization: {:.1}%\n\
         Peak utilization: {:.1}%\n\
         Average used: {:.1} MB\n\
         Peak used: {:.1} MB\n\
         Samples: {}\n{rule}\n",
        s.avg_percent, s.max_percent, s.avg_used_mb, s.max_used_mb as f64, s.sample_count,
    )
}
