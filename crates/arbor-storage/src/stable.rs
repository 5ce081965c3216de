//! The stable, versioned on-disk and wire schema for graph snapshots.
//!
//! Two schema versions exist. [`v1`] records carry, per node, its type tag
//! and optional source location. [`v2`] adds the node's numeric id.
//! Conversions never fail:
//!
//! - [`downgrade`] (2 → 1) drops the ids;
//! - [`upgrade`] (1 → 2) fills in [`MISSING_ID`];
//! - [`upgrade_with_ids`] (1 → 2) takes ids from a reference v2 record
//!   wherever the reference knows the path, so `v2 → v1 → v2` recovers every
//!   id that was present.
//!
//! On the wire a record travels in a [`VersionedGraph`] envelope,
//! `{"version": n, "graph": {...}}`. Any version other than 1 or 2 is
//! rejected when the envelope is decoded.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Id recorded for a node whose id is unknown.
pub const MISSING_ID: i64 = -1;

/// The newest schema version.
pub const LATEST_VERSION: u64 = 2;

pub mod v1 {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NodeInfo {
        pub node_type: String,
        #[serde(default)]
        pub here: Option<String>,
    }

    /// Snapshot keyed by path text.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Graph {
        #[serde(default)]
        pub tree: BTreeMap<String, String>,
        #[serde(default)]
        pub dag: BTreeMap<String, Vec<String>>,
        #[serde(default)]
        pub info: BTreeMap<String, NodeInfo>,
    }
}

pub mod v2 {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NodeInfo {
        pub node_type: String,
        #[serde(default)]
        pub here: Option<String>,
        /// [`MISSING_ID`] when unknown.
        pub id: i64,
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Graph {
        #[serde(default)]
        pub tree: BTreeMap<String, String>,
        #[serde(default)]
        pub dag: BTreeMap<String, Vec<String>>,
        #[serde(default)]
        pub info: BTreeMap<String, NodeInfo>,
    }
}

/// Drops the per-node ids.
pub fn downgrade(graph: &v2::Graph) -> v1::Graph {
    v1::Graph {
        tree: graph.tree.clone(),
        dag: graph.dag.clone(),
        info: graph
            .info
            .iter()
            .map(|(path, info)| {
                let info = v1::NodeInfo {
                    node_type: info.node_type.clone(),
                    here: info.here.clone(),
                };
                (path.clone(), info)
            })
            .collect(),
    }
}

/// Adds [`MISSING_ID`] to every node.
pub fn upgrade(graph: &v1::Graph) -> v2::Graph {
    upgrade_with(graph, |_| MISSING_ID)
}

/// Like [`upgrade`], but takes each node's id from `reference` when it has
/// a node at the same path.
pub fn upgrade_with_ids(graph: &v1::Graph, reference: &v2::Graph) -> v2::Graph {
    upgrade_with(graph, |path| reference.info.get(path).map_or(MISSING_ID, |info| info.id))
}

fn upgrade_with(graph: &v1::Graph, id_of: impl Fn(&str) -> i64) -> v2::Graph {
    v2::Graph {
        tree: graph.tree.clone(),
        dag: graph.dag.clone(),
        info: graph
            .info
            .iter()
            .map(|(path, info)| {
                let info = v2::NodeInfo {
                    node_type: info.node_type.clone(),
                    here: info.here.clone(),
                    id: id_of(path),
                };
                (path.clone(), info)
            })
            .collect(),
    }
}

/// A snapshot record together with its schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedGraph {
    V1(v1::Graph),
    V2(v2::Graph),
}

#[derive(Serialize)]
struct EnvelopeRef<'a, G> {
    version: u64,
    graph: &'a G,
}

#[derive(Deserialize)]
struct RawEnvelope {
    version: u64,
    graph: serde_json::Value,
}

impl VersionedGraph {
    pub fn version(&self) -> u64 {
        match self {
            VersionedGraph::V1(_) => 1,
            VersionedGraph::V2(_) => 2,
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            VersionedGraph::V1(graph) => graph.info.len(),
            VersionedGraph::V2(graph) => graph.info.len(),
        }
    }

    /// The record in the latest schema.
    pub fn to_latest(&self) -> v2::Graph {
        match self {
            VersionedGraph::V1(graph) => upgrade(graph),
            VersionedGraph::V2(graph) => graph.clone(),
        }
    }

    /// Converts to schema `version`.
    pub fn to_version(&self, version: u64) -> Result<VersionedGraph, StorageError> {
        match (self, version) {
            (VersionedGraph::V1(_), 1) | (VersionedGraph::V2(_), 2) => Ok(self.clone()),
            (VersionedGraph::V1(graph), 2) => Ok(VersionedGraph::V2(upgrade(graph))),
            (VersionedGraph::V2(graph), 1) => Ok(VersionedGraph::V1(downgrade(graph))),
            (_, found) => Err(StorageError::UnsupportedVersion { found }),
        }
    }

    /// Decodes a bare graph record of the given schema version.
    pub fn from_parts(version: u64, graph: serde_json::Value) -> Result<Self, StorageError> {
        match version {
            1 => Ok(VersionedGraph::V1(serde_json::from_value(graph)?)),
            2 => Ok(VersionedGraph::V2(serde_json::from_value(graph)?)),
            found => Err(StorageError::UnsupportedVersion { found }),
        }
    }

    /// The bare graph record, without the envelope.
    pub fn graph_json(&self) -> Result<String, StorageError> {
        Ok(match self {
            VersionedGraph::V1(graph) => serde_json::to_string(graph)?,
            VersionedGraph::V2(graph) => serde_json::to_string(graph)?,
        })
    }

    /// Decodes an envelope, rejecting unknown versions.
    pub fn from_json(text: &str) -> Result<Self, StorageError> {
        let raw: RawEnvelope =
            serde_json::from_str(text).map_err(|err| StorageError::MalformedEnvelope {
                reason: err.to_string(),
            })?;
        Self::from_parts(raw.version, raw.graph)
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Serialize for VersionedGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            VersionedGraph::V1(graph) => EnvelopeRef { version: 1, graph }.serialize(serializer),
            VersionedGraph::V2(graph) => EnvelopeRef { version: 2, graph }.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for VersionedGraph {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEnvelope::deserialize(deserializer)?;
        VersionedGraph::from_parts(raw.version, raw.graph).map_err(de::Error::custom)
    }
}
