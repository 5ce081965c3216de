//! In-memory implementation of [`SnapshotStore`].

use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::hash::content_hash;
use crate::stable::VersionedGraph;
use crate::traits::SnapshotStore;
use crate::types::{SnapshotId, SnapshotSummary};

#[derive(Debug, Clone)]
struct StoredSnapshot {
    name: String,
    graph: VersionedGraph,
    content_hash: String,
}

/// In-memory implementation of [`SnapshotStore`], for tests and ephemeral
/// sessions.
#[derive(Debug)]
pub struct InMemoryStore {
    snapshots: BTreeMap<SnapshotId, StoredSnapshot>,
    next_id: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            snapshots: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn get_stored(&self, id: SnapshotId) -> Result<&StoredSnapshot, StorageError> {
        self.snapshots.get(&id).ok_or(StorageError::SnapshotNotFound(id.0))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for InMemoryStore {
    fn save_snapshot(
        &mut self,
        name: &str,
        graph: &VersionedGraph,
    ) -> Result<SnapshotId, StorageError> {
        let content_hash = content_hash(graph)?;
        let id = SnapshotId(self.next_id);
        self.next_id += 1;
        self.snapshots.insert(
            id,
            StoredSnapshot {
                name: name.to_string(),
                graph: graph.clone(),
                content_hash,
            },
        );
        Ok(id)
    }

    fn load_versioned(&self, id: SnapshotId) -> Result<VersionedGraph, StorageError> {
        Ok(self.get_stored(id)?.graph.clone())
    }

    fn delete_snapshot(&mut self, id: SnapshotId) -> Result<(), StorageError> {
        self.snapshots
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::SnapshotNotFound(id.0))
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>, StorageError> {
        Ok(self
            .snapshots
            .iter()
            .map(|(id, stored)| SnapshotSummary {
                id: *id,
                name: stored.name.clone(),
                version: stored.graph.version(),
                content_hash: stored.content_hash.clone(),
                node_count: stored.graph.node_count(),
            })
            .collect())
    }

    fn find_by_hash(&self, content_hash: &str) -> Result<Option<SnapshotId>, StorageError> {
        Ok(self
            .snapshots
            .iter()
            .find(|(_, stored)| stored.content_hash == content_hash)
            .map(|(id, _)| *id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stable::{downgrade, v2, MISSING_ID};

    fn graph() -> v2::Graph {
        let mut graph = v2::Graph::default();
        graph.info.insert(
            "root".into(),
            v2::NodeInfo {
                node_type: "leaf0".into(),
                here: Some("demo.rs:1:1".into()),
                id: 12,
            },
        );
        graph
    }

    #[test]
    fn save_load_list_delete() {
        let mut store = InMemoryStore::new();
        let a = store.save_snapshot("a", &VersionedGraph::V2(graph())).unwrap();
        let b = store.save_snapshot("b", &VersionedGraph::V1(downgrade(&graph()))).unwrap();
        assert_ne!(a, b);

        assert_eq!(store.load_snapshot(a).unwrap(), graph());
        assert_eq!(store.load_versioned(b).unwrap().version(), 1);
        assert_eq!(store.load_snapshot(b).unwrap().info["root"].id, MISSING_ID);

        let listed = store.list_snapshots().unwrap();
        assert_eq!(listed.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(listed[0].node_count, 1);

        store.delete_snapshot(a).unwrap();
        assert!(matches!(store.load_snapshot(a), Err(StorageError::SnapshotNotFound(_))));
        assert!(matches!(store.delete_snapshot(a), Err(StorageError::SnapshotNotFound(_))));
    }

    #[test]
    fn finds_snapshots_by_content() {
        let mut store = InMemoryStore::new();
        let id = store.save_snapshot("a", &VersionedGraph::V2(graph())).unwrap();
        let hash = content_hash(&VersionedGraph::V2(graph())).unwrap();
        assert_eq!(store.find_by_hash(&hash).unwrap(), Some(id));
        assert_eq!(store.find_by_hash("0000").unwrap(), None);
    }
}
