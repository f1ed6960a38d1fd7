//! Multi-rank checkpoints with every participant running on its own thread.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rankwatch_sdk::{
    Aggregator, BarrierWait, CoordinationStore, DeviceReading, FileStore, Membership,
    MemoryStore, Output, QueryError, Recorder, ResourceMonitor, TimingReport, TimingSnapshot,
};
use tempfile::TempDir;

const WAIT: BarrierWait = BarrierWait::Timeout(Duration::from_secs(30));

/// Run `world_size` participants over clones of `store`, returning their results in rank order.
fn run_ranks<S, T, F>(store: S, world_size: usize, body: F) -> Vec<T>
where
    S: CoordinationStore + Clone + 'static,
    T: Send + 'static,
    F: Fn(Aggregator) -> T + Send + Sync + 'static,
{
    let body = Arc::new(body);
    let handles: Vec<_> = (0..world_size)
        .map(|rank| {
            let store = store.clone();
            let body = body.clone();
            thread::spawn(move || {
                let membership = Membership::new(rank, world_size).unwrap();
                let aggregator = Aggregator::builder(membership, Arc::new(store))
                    .barrier_wait(WAIT)
                    .build()
                    .unwrap();
                body(aggregator)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// Publish a snapshot whose "forward" key holds `total_secs` over `count` calls.
fn publish_fixed(output: &Output, rank: usize, total_secs: f64, count: u64) {
    let snapshot = TimingSnapshot::builder(rank)
        .entry("forward", total_secs, count)
        .build();
    output.publish(&snapshot).unwrap();
}

#[test]
fn memory_store_four_ranks() {
    let results = run_ranks(MemoryStore::new(4), 4, |aggregator| {
        let recorder = Recorder::new();
        for _ in 0..3 {
            let _guard = recorder.timing("forward").attribute("spmm");
        }
        aggregator.aggregate(&recorder).unwrap()
    });

    let report = results[0].as_ref().unwrap();
    assert!(results[1..].iter().all(Option::is_none));
    assert_eq!(report.participants, 4);

    for key in ["forward", "forward-spmm"] {
        let row = report.row(key).unwrap();
        assert_eq!(row.count, 3);
        assert_eq!(row.stat.count, 4);
        assert!(row.stat.std_dev >= 0.0);
    }
}

#[test]
fn file_store_across_checkpoints() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path(), 3).with_poll_interval(Duration::from_millis(1));

    let results = run_ranks(store, 3, |aggregator| {
        let recorder = Recorder::new();
        let mut reports = Vec::new();
        for _ in 0..3 {
            recorder.time("step", || ());
            reports.push(aggregator.aggregate(&recorder).unwrap());
        }
        reports
    });

    let counts: Vec<u64> = results[0]
        .iter()
        .map(|r| r.as_ref().unwrap().row("step").unwrap().count)
        .collect();
    assert_eq!(counts, vec![1, 2, 3]);
    assert!(results[1..].iter().flatten().all(Option::is_none));
}

#[test]
fn ten_twelve_eleven() {
    let store = MemoryStore::new(3);
    let output = Output::store(Arc::new(store.clone()));
    publish_fixed(&output, 1, 12.0, 5);
    publish_fixed(&output, 2, 11.0, 5);
    publish_fixed(&output, 0, 10.0, 5);

    let found: Vec<TimingSnapshot> = output.gather(3).into_iter().flatten().collect();
    let report = TimingReport::from_snapshots(&found[0], &found).unwrap();
    let row = report.row("forward").unwrap();

    assert!((row.stat.mean - 11.0).abs() < 1e-9);
    assert!((row.stat.std_dev - 1.0).abs() < 1e-9);
    assert_eq!(row.count, 5);
    assert_eq!(report.summary(), "\ntimer summary:\n 11.00s   1.00s     5 forward");
}

#[test]
fn missing_participant_degrades_to_present_ones() {
    let dir = TempDir::new().unwrap();
    let output = Output::directory(dir.path());
    publish_fixed(&output, 0, 10.0, 5);
    publish_fixed(&output, 2, 12.0, 5);

    let gathered = output.gather::<TimingSnapshot>(3);
    assert!(gathered[1].is_none());

    let found: Vec<TimingSnapshot> = gathered.into_iter().flatten().collect();
    let report = TimingReport::from_snapshots(&found[0], &found).unwrap();
    assert_eq!(report.participants, 2);
    assert!((report.row("forward").unwrap().stat.mean - 11.0).abs() < 1e-9);
}

#[test]
fn nothing_published_is_empty() {
    let dir = TempDir::new().unwrap();
    let output = Output::directory(dir.path());
    let found: Vec<TimingSnapshot> = output.gather(2).into_iter().flatten().collect();
    assert!(found.is_empty());
    assert!(TimingReport::from_snapshots(&TimingSnapshot::builder(0).build(), &found).is_none());
}

#[test]
fn memory_samples_across_ranks() {
    let results = run_ranks(MemoryStore::new(2), 2, |aggregator| {
        let rank = aggregator.membership().rank() as u64;
        let monitor = ResourceMonitor::builder(aggregator.membership().rank())
            .query(move || -> Result<DeviceReading, QueryError> {
                Ok(DeviceReading {
                    used_mb: 1000 * (rank + 1),
                    total_mb: 10000,
                })
            })
            .build();
        monitor.sample_resource_usage();
        monitor.sample_resource_usage();
        aggregator.aggregate_resources(&monitor).unwrap()
    });

    let report = results[0].as_ref().unwrap();
    assert!(results[1].is_none());

    let global = report.global.unwrap();
    assert!((global.avg_percent - 15.0).abs() < 1e-9);
    assert!((global.max_percent - 20.0).abs() < 1e-9);
    assert_eq!(global.max_used_mb, 2000);
    assert_eq!(report.rank(1).unwrap().summary.unwrap().sample_count, 2);
}
