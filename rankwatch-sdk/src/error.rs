//! Error types for recording, exchange, and aggregation.

use std::path::PathBuf;
use std::time::Duration;

use rankwatch_types::{Rank, SchemaVersion};
use thiserror::Error;

/// Errors raised by a [`CoordinationStore`](crate::CoordinationStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key was never written.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The key cannot be represented by this store.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// The backing medium failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while querying device memory.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query command could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The query did not finish in time.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// The query exited unsuccessfully.
    #[error("query exited with {0}")]
    ExitStatus(std::process::ExitStatus),

    /// The query output did not have the expected shape.
    #[error("failed to parse query output: {0}")]
    Parse(String),

    /// Reading the query output failed.
    #[error("query I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// No device is available to query.
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while publishing or fetching snapshots.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("snapshot file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(String),

    #[error("failed to decode snapshot: {0}")]
    Decode(String),

    /// The snapshot was written by an incompatible schema.
    #[error("rank {rank} published schema {found}, expected major {expected}")]
    IncompatibleVersion {
        rank: Rank,
        found: SchemaVersion,
        expected: u32,
    },

    /// The snapshot stored under one rank's key claims another rank.
    #[error("snapshot stored for rank {expected} claims rank {found}")]
    RankMismatch { expected: Rank, found: Rank },
}

/// Errors raised by the local recorder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// `end_timing` was called for a key with no open interval.
    #[error("no open interval for key {0:?}")]
    NotStarted(String),
}

/// Errors raised while resolving the participant's identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} is not a valid integer: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("group size must be at least 1")]
    EmptyGroup,

    #[error("rank {rank} is outside a group of {world_size}")]
    RankOutOfRange { rank: Rank, world_size: usize },

    /// The store's barrier would release a different number of participants.
    #[error("store expects {store} participants but the world size is {world_size}")]
    GroupMismatch { store: usize, world_size: usize },
}

/// Errors raised by the [`Aggregator`](crate::Aggregator).
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The barrier timed out and the aggregator is configured to fail.
    #[error("barrier {group:?} timed out before every participant arrived")]
    BarrierTimedOut { group: String },
}
