//! Snapshot schema versions.

use core::fmt;

use crate::SCHEMA_VERSION;

/// `major.minor` version stamped into every snapshot.
///
/// Readers accept any minor version of their own major; a snapshot from a
/// different major is skipped rather than misread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    /// The version this library writes.
    pub const CURRENT: SchemaVersion = SchemaVersion::new(SCHEMA_VERSION, 0);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub const fn current() -> Self {
        Self::CURRENT
    }

    /// Whether a reader built against this library can decode the snapshot.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
