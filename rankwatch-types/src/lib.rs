//! # rankwatch-types
//!
//! Core types for distributed metrics collection. This crate defines the
//! snapshot schema every participant (rank) of a distributed run publishes,
//! and the statistics the coordinator derives from those snapshots.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable `serde` to exchange snapshots as JSON or CBOR
//! - **Identity-tagged**: Every snapshot carries the rank that produced it
//! - **Versioned schema**: Snapshots include version info for forward compatibility
//!
//! ## Features
//!
//! - `std` (default): Standard library support (timestamps, statistics)
//! - `serde`: Serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use rankwatch_types::{AggregateStat, TimingSnapshot};
//!
//! let snapshot = TimingSnapshot::builder(0)
//!     .entry("forward", 10.0, 5)
//!     .entry("backward", 22.5, 5)
//!     .build();
//!
//! assert_eq!(snapshot.len(), 2);
//! assert_eq!(snapshot.get("forward").map(|e| e.count), Some(5));
//!
//! let stat = AggregateStat::from_values(vec![10.0, 12.0, 11.0]).unwrap();
//! assert_eq!(stat.mean, 11.0);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod family;
mod resource;
mod stats;
mod timing;
mod version;

pub use family::*;
pub use resource::*;
pub use stats::*;
pub use timing::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SCHEMA_VERSION: u32 = 1;

/// Zero-based identity of a participant in the distributed group.
pub type Rank = usize;

/// Get current timestamp in milliseconds since Unix epoch.
#[cfg(feature = "std")]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
