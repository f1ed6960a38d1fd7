//! Snapshot persistence: where a participant publishes its snapshot and
//! where the coordinator finds everyone's.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rankwatch_types::{
    MetricFamily, Rank, ResourceSnapshot, SchemaVersion, TimingSnapshot, SCHEMA_VERSION,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PersistError, StoreError};
use crate::store::CoordinationStore;

/// A snapshot a participant publishes once per checkpoint.
pub trait ParticipantSnapshot: Serialize + DeserializeOwned {
    /// Family that scopes the snapshot's key.
    const FAMILY: MetricFamily;

    /// Rank that produced the snapshot.
    fn rank(&self) -> Rank;

    fn version(&self) -> SchemaVersion;
}

impl ParticipantSnapshot for TimingSnapshot {
    const FAMILY: MetricFamily = TimingSnapshot::FAMILY;

    fn rank(&self) -> Rank {
        self.rank
    }

    fn version(&self) -> SchemaVersion {
        self.version
    }
}

impl ParticipantSnapshot for ResourceSnapshot {
    const FAMILY: MetricFamily = ResourceSnapshot::FAMILY;

    fn rank(&self) -> Rank {
        self.rank
    }

    fn version(&self) -> SchemaVersion {
        self.version
    }
}

/// Encoding used for store blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Json,
    /// Compact binary encoding.
    #[cfg(feature = "cbor")]
    Cbor,
}

impl Codec {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, PersistError> {
        match self {
            Codec::Json => {
                serde_json::to_vec(value).map_err(|e| PersistError::Encode(e.to_string()))
            }
            #[cfg(feature = "cbor")]
            Codec::Cbor => {
                minicbor_serde::to_vec(value).map_err(|e| PersistError::Encode(e.to_string()))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, PersistError> {
        match self {
            Codec::Json => {
                serde_json::from_slice(bytes).map_err(|e| PersistError::Decode(e.to_string()))
            }
            #[cfg(feature = "cbor")]
            Codec::Cbor => {
                minicbor_serde::from_slice(bytes).map_err(|e| PersistError::Decode(e.to_string()))
            }
        }
    }
}

/// Destination for published snapshots.
///
/// Snapshots are addressed by `<family>_<rank>`: as a store key, or as
/// `<dir>/<family>_<rank>.json`.
#[derive(Debug, Clone)]
pub enum Output {
    /// Publish into a coordination store.
    Store {
        store: Arc<dyn CoordinationStore>,
        codec: Codec,
    },

    /// Write one JSON file per participant into a directory.
    ///
    /// The directory outlives the run, which is what the offline
    /// aggregator reads.
    Directory(PathBuf),
}

impl Output {
    /// Publish into a store using JSON blobs.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use rankwatch_sdk::{MemoryStore, Output};
    ///
    /// let output = Output::store(Arc::new(MemoryStore::new(2)));
    /// ```
    pub fn store(store: Arc<dyn CoordinationStore>) -> Self {
        Output::Store {
            store,
            codec: Codec::default(),
        }
    }

    /// Publish into a store with a specific blob codec.
    pub fn store_with_codec(store: Arc<dyn CoordinationStore>, codec: Codec) -> Self {
        Output::Store { store, codec }
    }

    /// Write snapshot files into a directory.
    ///
    /// ```rust
    /// use rankwatch_sdk::Output;
    ///
    /// let output = Output::directory("./gpu_recorder");
    /// ```
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Output::Directory(path.into())
    }

    /// Where the snapshot of `rank` lives, for logs.
    pub fn location<S: ParticipantSnapshot>(&self, rank: Rank) -> String {
        match self {
            Output::Store { store, .. } => {
                format!("{} key {}", store.description(), S::FAMILY.key(rank))
            }
            Output::Directory(dir) => dir.join(S::FAMILY.file_name(rank)).display().to_string(),
        }
    }

    /// Publish a snapshot under its own rank.
    ///
    /// Returns once the snapshot is durable in the destination, so a barrier
    /// entered afterwards orders it before any coordinator read.
    pub fn publish<S: ParticipantSnapshot>(&self, snapshot: &S) -> Result<(), PersistError> {
        let rank = snapshot.rank();
        match self {
            Output::Store { store, codec } => {
                let bytes = codec.encode(snapshot)?;
                store.put(&S::FAMILY.key(rank), &bytes)?;
            }
            Output::Directory(dir) => {
                let path = dir.join(S::FAMILY.file_name(rank));
                let json = serde_json::to_vec_pretty(snapshot)
                    .map_err(|e| PersistError::Encode(e.to_string()))?;
                write_atomically(dir, &path, &json)
                    .map_err(|source| PersistError::Io { path, source })?;
            }
        }
        tracing::debug!(rank, location = %self.location::<S>(rank), "published snapshot");
        Ok(())
    }

    /// Fetch the snapshot published by `rank`.
    ///
    /// Returns `Ok(None)` when nothing was published for that rank, and
    /// [`PersistError::RankMismatch`] when the snapshot names a different rank.
    pub fn fetch<S: ParticipantSnapshot>(&self, rank: Rank) -> Result<Option<S>, PersistError> {
        let snapshot: S = match self {
            Output::Store { store, codec } => match store.get(&S::FAMILY.key(rank)) {
                Ok(bytes) => codec.decode(&bytes)?,
                Err(StoreError::NotFound(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            },
            Output::Directory(dir) => {
                let path = dir.join(S::FAMILY.file_name(rank));
                match fs::read(&path) {
                    Ok(bytes) => serde_json::from_slice(&bytes)
                        .map_err(|e| PersistError::Decode(format!("{}: {}", path.display(), e)))?,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                    Err(source) => return Err(PersistError::Io { path, source }),
                }
            }
        };

        if snapshot.rank() != rank {
            return Err(PersistError::RankMismatch {
                expected: rank,
                found: snapshot.rank(),
            });
        }

        let version = snapshot.version();
        if !version.is_compatible() {
            return Err(PersistError::IncompatibleVersion {
                rank,
                found: version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(Some(snapshot))
    }

    /// Fetch the snapshot of every rank in `0..world_size`.
    ///
    /// Missing or unreadable snapshots are logged and come back as `None`;
    /// they never fail the whole gather.
    pub fn gather<S: ParticipantSnapshot>(&self, world_size: usize) -> Vec<Option<S>> {
        (0..world_size)
            .map(|rank| match self.fetch::<S>(rank) {
                Ok(Some(snapshot)) => Some(snapshot),
                Ok(None) => {
                    tracing::warn!(
                        rank,
                        location = %self.location::<S>(rank),
                        "snapshot missing, skipping"
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!(rank, error = %e, "snapshot unreadable, skipping");
                    None
                }
            })
            .collect()
    }
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.tmp-{}", file_name, std::process::id()));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rankwatch_types::ResourceSample;
    use tempfile::TempDir;

    fn timing(rank: Rank, forward: f64) -> TimingSnapshot {
        TimingSnapshot::builder(rank)
            .timestamp_ms(1)
            .entry("forward", forward, 5)
            .build()
    }

    #[test]
    fn store_round_trip() {
        let store = MemoryStore::new(2);
        let output = Output::store(Arc::new(store.clone()));

        output.publish(&timing(1, 12.0)).unwrap();
        assert!(store.get("duration_dict_1").is_ok());

        let fetched: TimingSnapshot = output.fetch(1).unwrap().unwrap();
        assert_eq!(fetched, timing(1, 12.0));
        assert!(output.fetch::<TimingSnapshot>(0).unwrap().is_none());
    }

    #[test]
    fn directory_round_trip() {
        let dir = TempDir::new().unwrap();
        let output = Output::directory(dir.path().join("gpu_recorder"));

        let snapshot =
            ResourceSnapshot::new(0, vec![ResourceSample::new(5, 100, 1000).unwrap()]);
        output.publish(&snapshot).unwrap();

        assert!(dir.path().join("gpu_recorder/gpu_memory_0.json").exists());
        let fetched: ResourceSnapshot = output.fetch(0).unwrap().unwrap();
        assert_eq!(fetched, snapshot);
    }

    #[test]
    fn families_do_not_collide() {
        let store = Arc::new(MemoryStore::new(1));
        let output = Output::store(store);

        output.publish(&timing(0, 1.0)).unwrap();
        assert!(output.fetch::<ResourceSnapshot>(0).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_decode_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("duration_dict_0.json"), "not json").unwrap();

        let output = Output::directory(dir.path());
        let err = output.fetch::<TimingSnapshot>(0).unwrap_err();
        assert!(matches!(err, PersistError::Decode(_)));
    }

    #[test]
    fn incompatible_schema_is_rejected() {
        let store = Arc::new(MemoryStore::new(1));
        let output = Output::store(store);

        let mut snapshot = timing(0, 1.0);
        snapshot.version = SchemaVersion::new(SCHEMA_VERSION + 1, 0);
        output.publish(&snapshot).unwrap();

        assert!(matches!(
            output.fetch::<TimingSnapshot>(0),
            Err(PersistError::IncompatibleVersion { rank: 0, .. })
        ));
    }

    #[test]
    fn gather_skips_missing_and_corrupt() {
        let dir = TempDir::new().unwrap();
        let output = Output::directory(dir.path());

        output.publish(&timing(0, 10.0)).unwrap();
        fs::write(dir.path().join("duration_dict_1.json"), "{").unwrap();
        output.publish(&timing(3, 11.0)).unwrap();

        let gathered = output.gather::<TimingSnapshot>(4);
        assert_eq!(gathered.len(), 4);
        assert!(gathered[0].is_some());
        assert!(gathered[1].is_none());
        assert!(gathered[2].is_none());
        assert_eq!(gathered[3].as_ref().map(|s| s.rank), Some(3));
    }

    #[test]
    fn snapshot_under_wrong_rank_is_skipped() {
        let dir = TempDir::new().unwrap();
        let output = Output::directory(dir.path());

        let snapshot =
            ResourceSnapshot::new(0, vec![ResourceSample::new(5, 100, 1000).unwrap()]);
        output.publish(&snapshot).unwrap();
        fs::copy(
            dir.path().join("gpu_memory_0.json"),
            dir.path().join("gpu_memory_1.json"),
        )
        .unwrap();

        assert!(matches!(
            output.fetch::<ResourceSnapshot>(1),
            Err(PersistError::RankMismatch { expected: 1, found: 0 })
        ));

        let gathered = output.gather::<ResourceSnapshot>(2);
        assert_eq!(gathered[0].as_ref().map(|s| s.rank), Some(0));
        assert!(gathered[1].is_none());
    }

    #[test]
    fn location_names_the_key() {
        let output = Output::directory("/data/timers");
        assert_eq!(
            output.location::<TimingSnapshot>(2),
            "/data/timers/duration_dict_2.json"
        );

        let output = Output::store(Arc::new(MemoryStore::new(1)));
        assert_eq!(output.location::<ResourceSnapshot>(1), "memory key gpu_memory_1");
    }

    #[cfg(feature = "cbor")]
    #[test]
    fn cbor_store_round_trip() {
        let output = Output::store_with_codec(Arc::new(MemoryStore::new(1)), Codec::Cbor);
        output.publish(&timing(0, 2.5)).unwrap();
        let fetched: TimingSnapshot = output.fetch(0).unwrap().unwrap();
        assert_eq!(fetched, timing(0, 2.5));
    }
}
