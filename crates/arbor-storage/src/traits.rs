//! The [`SnapshotStore`] trait defining the storage contract for graph
//! snapshots.
//!
//! Snapshots are stored in the schema version they were saved with.
//! [`SnapshotStore::load_versioned`] returns them as stored;
//! [`SnapshotStore::load_snapshot`] always returns the latest schema.
//! All backends implement this trait and are swappable.

use crate::error::StorageError;
use crate::stable::{v2, VersionedGraph};
use crate::types::{SnapshotId, SnapshotSummary};

/// The storage contract for graph snapshots.
///
/// The trait is synchronous, matching the single-threaded driver.
pub trait SnapshotStore {
    /// Saves `graph` under `name` and returns its new id.
    fn save_snapshot(
        &mut self,
        name: &str,
        graph: &VersionedGraph,
    ) -> Result<SnapshotId, StorageError>;

    /// Loads a snapshot upgraded to the latest schema.
    fn load_snapshot(&self, id: SnapshotId) -> Result<v2::Graph, StorageError> {
        Ok(self.load_versioned(id)?.to_latest())
    }

    /// Loads a snapshot in the schema version it was saved with.
    fn load_versioned(&self, id: SnapshotId) -> Result<VersionedGraph, StorageError>;

    fn delete_snapshot(&mut self, id: SnapshotId) -> Result<(), StorageError>;

    /// Lists all stored snapshots, oldest first.
    fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>, StorageError>;

    /// Finds the oldest snapshot with the given content hash.
    fn find_by_hash(&self, content_hash: &str) -> Result<Option<SnapshotId>, StorageError>;
}
