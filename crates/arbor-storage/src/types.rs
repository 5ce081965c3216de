//! Storage-layer types for snapshot identity and metadata.
//!
//! [`SnapshotId`] lives here rather than in arbor-core: a graph snapshot only
//! gains an identity once it is persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a stored snapshot. The inner `i64` aligns with
/// SQLite's `INTEGER PRIMARY KEY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub i64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

/// Summary of a stored snapshot (for listing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub name: String,
    /// Schema version the snapshot was saved with.
    pub version: u64,
    /// Hex blake3 hash of the latest-schema encoding.
    pub content_hash: String,
    pub node_count: usize,
}
