//! SQLite implementation of [`SnapshotStore`].
//!
//! [`SqliteStore`] keeps one row per snapshot: the bare graph record as
//! JSON TEXT, the schema version it was saved with, and its content hash.
//! Every write runs in a transaction.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;
use crate::hash::content_hash;
use crate::stable::VersionedGraph;
use crate::traits::SnapshotStore;
use crate::types::{SnapshotId, SnapshotSummary};

/// SQLite-backed implementation of [`SnapshotStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }
}

impl SnapshotStore for SqliteStore {
    fn save_snapshot(
        &mut self,
        name: &str,
        graph: &VersionedGraph,
    ) -> Result<SnapshotId, StorageError> {
        let content_hash = content_hash(graph)?;
        let graph_json = graph.graph_json()?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO snapshots (name, version, content_hash, node_count, graph_json) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                graph.version() as i64,
                content_hash,
                graph.node_count() as i64,
                graph_json
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        tracing::debug!(id, name, version = graph.version(), "snapshot saved");
        Ok(SnapshotId(id))
    }

    fn load_versioned(&self, id: SnapshotId) -> Result<VersionedGraph, StorageError> {
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT version, graph_json FROM snapshots WHERE id = ?1",
                params![id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (version, graph_json) = row.ok_or(StorageError::SnapshotNotFound(id.0))?;
        let version = u64::try_from(version).map_err(|_| StorageError::MalformedEnvelope {
            reason: format!("negative version {version} stored for {id}"),
        })?;
        VersionedGraph::from_parts(version, serde_json::from_str(&graph_json)?)
    }

    fn delete_snapshot(&mut self, id: SnapshotId) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM snapshots WHERE id = ?1", params![id.0])?;
        tx.commit()?;
        if deleted == 0 {
            return Err(StorageError::SnapshotNotFound(id.0));
        }
        Ok(())
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, name, version, content_hash, node_count FROM snapshots ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let version: i64 = row.get(2)?;
            let node_count: i64 = row.get(4)?;
            Ok(SnapshotSummary {
                id: SnapshotId(id),
                name: row.get(1)?,
                version: version as u64,
                content_hash: row.get(3)?,
                node_count: node_count as usize,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn find_by_hash(&self, content_hash: &str) -> Result<Option<SnapshotId>, StorageError> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM snapshots WHERE content_hash = ?1 ORDER BY id LIMIT 1",
                params![content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(SnapshotId))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stable::{downgrade, upgrade_with_ids, v2, MISSING_ID};

    fn graph() -> v2::Graph {
        let mut graph = v2::Graph::default();
        graph.tree.insert("root.0".into(), "root".into());
        graph.tree.insert("root.1".into(), "root".into());
        let nodes = [
            ("root", "sub", 5),
            ("root.0", "leaf0", 7),
            ("root.1", "return", MISSING_ID),
        ];
        for (path, node_type, id) in nodes {
            graph.info.insert(
                path.into(),
                v2::NodeInfo {
                    node_type: node_type.into(),
                    here: None,
                    id,
                },
            );
        }
        graph
    }

    #[test]
    fn stores_each_version_as_saved() {
        let mut store = SqliteStore::in_memory().unwrap();
        let v2_id = store.save_snapshot("v2", &VersionedGraph::V2(graph())).unwrap();
        let v1_id = store.save_snapshot("v1", &VersionedGraph::V1(downgrade(&graph()))).unwrap();

        assert_eq!(store.load_versioned(v2_id).unwrap(), VersionedGraph::V2(graph()));
        let v1 = store.load_versioned(v1_id).unwrap();
        assert_eq!(v1.version(), 1);

        // Stored v1 records come back upgraded, and the ids can be recovered
        // from the v2 copy.
        let latest = store.load_snapshot(v1_id).unwrap();
        assert!(latest.info.values().all(|info| info.id == MISSING_ID));
        let VersionedGraph::V1(v1) = v1 else {
            panic!("expected a v1 record");
        };
        assert_eq!(upgrade_with_ids(&v1, &store.load_snapshot(v2_id).unwrap()), graph());
    }

    #[test]
    fn missing_snapshots_are_reported() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert!(matches!(
            store.load_versioned(SnapshotId(9)),
            Err(StorageError::SnapshotNotFound(9))
        ));
        assert!(matches!(
            store.delete_snapshot(SnapshotId(9)),
            Err(StorageError::SnapshotNotFound(9))
        ));
    }

    #[test]
    fn list_and_find_by_hash() {
        let mut store = SqliteStore::in_memory().unwrap();
        let first = store.save_snapshot("first", &VersionedGraph::V2(graph())).unwrap();
        store.save_snapshot("again", &VersionedGraph::V2(graph())).unwrap();

        let listed = store.list_snapshots().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "first");
        assert_eq!(listed[0].node_count, 3);
        assert_eq!(listed[0].content_hash, listed[1].content_hash);
        assert_eq!(store.find_by_hash(&listed[1].content_hash).unwrap(), Some(first));

        store.delete_snapshot(first).unwrap();
        assert_eq!(store.list_snapshots().unwrap().len(), 1);
    }
}
