//! Conversion between in-memory graph snapshots and stable records.
//!
//! Paths are stored in their text form (`root.0.1`). Only structural paths
//! appear in snapshots, so every stored path parses back.

use std::collections::BTreeMap;

use arbor_core::{GraphSnapshot, NodeInfo, NodePath};

use crate::error::StorageError;
use crate::stable::v2;

/// Encodes a snapshot in the latest stable schema.
pub fn snapshot_to_stable(snapshot: &GraphSnapshot) -> v2::Graph {
    v2::Graph {
        tree: snapshot
            .tree
            .iter()
            .map(|(child, parent)| (child.to_string(), parent.to_string()))
            .collect(),
        dag: snapshot
            .dag
            .iter()
            .map(|(node, deps)| (node.to_string(), deps.iter().map(NodePath::to_string).collect()))
            .collect(),
        info: snapshot
            .info
            .iter()
            .map(|(path, info)| {
                let info = v2::NodeInfo {
                    node_type: info.node_type.clone(),
                    here: info.here.clone(),
                    id: info.id,
                };
                (path.to_string(), info)
            })
            .collect(),
    }
}

/// Decodes a stable record back into a snapshot.
pub fn stable_to_snapshot(graph: &v2::Graph) -> Result<GraphSnapshot, StorageError> {
    let parse = |text: &String| -> Result<NodePath, StorageError> { Ok(text.parse::<NodePath>()?) };

    let mut tree = BTreeMap::new();
    for (child, parent) in &graph.tree {
        tree.insert(parse(child)?, parse(parent)?);
    }
    let mut dag = BTreeMap::new();
    for (node, deps) in &graph.dag {
        let deps = deps.iter().map(parse).collect::<Result<Vec<_>, _>>()?;
        dag.insert(parse(node)?, deps);
    }
    let mut info = BTreeMap::new();
    for (path, record) in &graph.info {
        let node = NodeInfo {
            node_type: record.node_type.clone(),
            here: record.here.clone(),
            id: record.id,
        };
        info.insert(parse(path)?, node);
    }
    Ok(GraphSnapshot { tree, dag, info })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{state, Computation};

    fn counter_snapshot() -> GraphSnapshot {
        let counter = state(0_i32).sub(|pair| Computation::return_(&pair.map(|(n, _)| *n)));
        GraphSnapshot::of_computation(&counter).unwrap()
    }

    #[test]
    fn snapshot_round_trips_through_the_stable_schema() {
        let snapshot = counter_snapshot();
        let stable = snapshot_to_stable(&snapshot);
        assert_eq!(stable.info.len(), snapshot.info.len());
        assert!(stable.info.contains_key("root"));
        assert_eq!(stable_to_snapshot(&stable).unwrap(), snapshot);
    }

    #[test]
    fn unparseable_paths_are_rejected() {
        let mut stable = snapshot_to_stable(&counter_snapshot());
        stable.tree.insert("node-7".to_string(), "root".to_string());
        let err = stable_to_snapshot(&stable).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
    }
}
