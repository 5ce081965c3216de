//! Deterministic content hashing of snapshot records using blake3.
//!
//! A record is hashed over its canonical JSON encoding in the latest schema.
//! All maps in the stable schema are `BTreeMap`s, so the encoding, and with
//! it the hash, does not depend on insertion order. Hashes are stored next
//! to each snapshot so identical graphs can be found without decoding.

use crate::error::StorageError;
use crate::stable::{v2, VersionedGraph};

/// Hashes a latest-schema record.
pub fn hash_graph(graph: &v2::Graph) -> Result<blake3::Hash, StorageError> {
    let bytes = serde_json::to_vec(graph)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"arbor-snapshot/v2\0");
    hasher.update(&bytes);
    Ok(hasher.finalize())
}

/// Hex hash of a record of any version, computed on its latest-schema form.
///
/// A v1 record and its plain upgrade hash the same.
pub fn content_hash(graph: &VersionedGraph) -> Result<String, StorageError> {
    Ok(hash_graph(&graph.to_latest())?.to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stable::{downgrade, MISSING_ID};

    fn graph(id: i64) -> v2::Graph {
        let mut graph = v2::Graph::default();
        graph.tree.insert("root.0".into(), "root".into());
        graph.info.insert(
            "root".into(),
            v2::NodeInfo {
                node_type: "sub".into(),
                here: None,
                id,
            },
        );
        graph
    }

    #[test]
    fn same_content_same_hash() {
        assert_eq!(hash_graph(&graph(3)).unwrap(), hash_graph(&graph(3)).unwrap());
    }

    #[test]
    fn ids_affect_the_hash() {
        assert_ne!(hash_graph(&graph(3)).unwrap(), hash_graph(&graph(4)).unwrap());
    }

    #[test]
    fn v1_hashes_like_its_upgrade() {
        let v1 = VersionedGraph::V1(downgrade(&graph(3)));
        let upgraded = VersionedGraph::V2(graph(MISSING_ID));
        assert_eq!(content_hash(&v1).unwrap(), content_hash(&upgraded).unwrap());
        assert_eq!(content_hash(&v1).unwrap().len(), 64);
    }
}
