//! Graph snapshots for inspection tooling.
//!
//! A [`GraphSnapshot`] holds three co-indexed maps keyed by structural path:
//! - `tree`: child path to parent path,
//! - `dag`: path to the paths that depend on it (a child's parent, and every
//!   reference to a bound variable whose binder is not one of its
//!   ancestors),
//! - `info`: per-node metadata.
//!
//! Snapshots are built from a stream of [`GraphUpdate`]s emitted by
//! [`iter_graph_updates`] as soon as each fact is discovered during a single
//! traversal.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use petgraph::algo::toposort;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::computation::{Computation, ComputationNode};
use crate::error::CoreError;
use crate::id::VarId;
use crate::location::SourceLocation;
use crate::path::NodePath;
use crate::transform::{transform, VisitCtx, Visitor};
use crate::value::ValueNode;

/// Marks a location copied from an ancestor.
pub const INHERITED_PREFIX: &str = "(inherited) ";

/// Metadata of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_type: String,
    pub here: Option<String>,
    pub id: i64,
}

impl NodeInfo {
    fn new(node_type: &str, here: &Option<SourceLocation>, id: u32) -> Self {
        NodeInfo {
            node_type: node_type.to_string(),
            here: here.as_ref().map(|loc| loc.to_string()),
            id: i64::from(id),
        }
    }

    /// Returns `true` if the location was copied from an ancestor.
    pub fn is_inherited(&self) -> bool {
        self.here
            .as_deref()
            .is_some_and(|here| here.starts_with(INHERITED_PREFIX))
    }
}

/// One fact about the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphUpdate {
    Tree { child: NodePath, parent: NodePath },
    Dag { from: NodePath, to: NodePath },
    Info { path: NodePath, info: NodeInfo },
}

struct UpdateEmitter<F> {
    emit: F,
}

impl<F: FnMut(GraphUpdate)> UpdateEmitter<F> {
    fn node(&mut self, cx: &VisitCtx<'_, NodePath>, info: NodeInfo) -> NodePath {
        (self.emit)(GraphUpdate::Info {
            path: cx.path.clone(),
            info,
        });
        if let Some(parent) = cx.parent {
            (self.emit)(GraphUpdate::Tree {
                child: cx.path.clone(),
                parent: parent.clone(),
            });
            (self.emit)(GraphUpdate::Dag {
                from: cx.path.clone(),
                to: parent.clone(),
            });
        }
        cx.path.clone()
    }
}

impl<F: FnMut(GraphUpdate)> Visitor for UpdateEmitter<F> {
    type Info = NodePath;

    fn computation(&mut self, cx: &VisitCtx<'_, NodePath>, node: &Rc<ComputationNode>) -> NodePath {
        self.node(cx, NodeInfo::new(node.kind.tag(), &node.here, node.id.0))
    }

    fn value(&mut self, cx: &VisitCtx<'_, NodePath>, node: &Rc<ValueNode>) -> NodePath {
        self.node(cx, NodeInfo::new(node.kind.tag(), &node.here, node.id.0))
    }

    fn reference(
        &mut self,
        _cx: &VisitCtx<'_, NodePath>,
        me: &NodePath,
        _var: VarId,
        binder: Option<&NodePath>,
    ) {
        // An ancestor binder already depends on the reference through the
        // tree edges; an edge back down would close a cycle.
        if let Some(binder) = binder.filter(|binder| !me.starts_with(binder)) {
            (self.emit)(GraphUpdate::Dag {
                from: binder.clone(),
                to: me.clone(),
            });
        }
    }
}

/// Streams the updates describing `node` to `on_update`.
pub fn iter_graph_updates(
    node: &Rc<ComputationNode>,
    on_update: impl FnMut(GraphUpdate),
) -> Result<(), CoreError> {
    let mut emitter = UpdateEmitter { emit: on_update };
    transform(node, &mut emitter)?;
    Ok(())
}

/// The tree, dependency graph and metadata of a computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub tree: BTreeMap<NodePath, NodePath>,
    pub dag: BTreeMap<NodePath, Vec<NodePath>>,
    pub info: BTreeMap<NodePath, NodeInfo>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        GraphSnapshot::default()
    }

    /// Builds the snapshot of `computation`, with inherited locations filled in.
    pub fn of_computation<T: 'static>(computation: &Computation<T>) -> Result<Self, CoreError> {
        let mut snapshot = GraphSnapshot::new();
        iter_graph_updates(computation.node(), |update| snapshot.apply(update))?;
        snapshot.pull_locations();
        tracing::debug!(nodes = snapshot.info.len(), "built graph snapshot");
        Ok(snapshot)
    }

    pub fn apply(&mut self, update: GraphUpdate) {
        match update {
            GraphUpdate::Tree { child, parent } => {
                self.tree.insert(child, parent);
            }
            GraphUpdate::Dag { from, to } => self.dag.entry(from).or_default().push(to),
            GraphUpdate::Info { path, info } => {
                self.info.insert(path, info);
            }
        }
    }

    /// Gives every node without a location the location of its nearest
    /// ancestor that has one, marked with [`INHERITED_PREFIX`]. Nodes with no
    /// such ancestor keep no location.
    pub fn pull_locations(&mut self) {
        let mut resolved: HashMap<NodePath, Option<String>> = HashMap::new();
        let missing: Vec<NodePath> = self
            .info
            .iter()
            .filter(|(_, info)| info.here.is_none())
            .map(|(path, _)| path.clone())
            .collect();

        for path in &missing {
            let mut chain = Vec::new();
            let mut cursor = self.tree.get(path).cloned();
            let found = loop {
                let Some(at) = cursor else { break None };
                if let Some(hit) = resolved.get(&at) {
                    break hit.clone();
                }
                let own = self.info.get(&at).and_then(|info| info.here.clone());
                if let Some(own) = own.filter(|here| !here.starts_with(INHERITED_PREFIX)) {
                    break Some(own);
                }
                cursor = self.tree.get(&at).cloned();
                chain.push(at);
            };
            for at in chain {
                resolved.insert(at, found.clone());
            }
            resolved.insert(path.clone(), found);
        }

        for path in missing {
            let found = resolved.get(&path);
            if let (Some(Some(here)), Some(info)) = (found, self.info.get_mut(&path)) {
                info.here = Some(format!("{INHERITED_PREFIX}{here}"));
            }
        }
    }

    /// The dependency DAG as a petgraph graph, plus the index of every path.
    pub fn dependency_graph(&self) -> (DiGraph<NodePath, ()>, BTreeMap<NodePath, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = BTreeMap::new();
        for path in self.info.keys() {
            index.insert(path.clone(), graph.add_node(path.clone()));
        }
        for (from, tos) in &self.dag {
            let from_ix = *index
                .entry(from.clone())
                .or_insert_with(|| graph.add_node(from.clone()));
            for to in tos {
                let to_ix = *index.entry(to.clone()).or_insert_with(|| graph.add_node(to.clone()));
                graph.add_edge(from_ix, to_ix, ());
            }
        }
        (graph, index)
    }

    /// Checks that the dependency graph has no cycle.
    pub fn validate(&self) -> Result<(), CoreError> {
        let (graph, _) = self.dependency_graph();
        toposort(&graph, None).map(|_| ()).map_err(|cycle| CoreError::DependencyCycle {
            path: graph[cycle.node_id()].to_string(),
        })
    }

    /// Graphviz rendering of the dependency graph, labelled with node types.
    pub fn to_dot(&self) -> String {
        let (graph, _) = self.dependency_graph();
        let labelled = graph.map(
            |_, path| match self.info.get(path) {
                Some(info) => format!("{} {}", info.node_type, path),
                None => path.to_string(),
            },
            |_, _| "",
        );
        format!("{}", Dot::with_config(&labelled, &[Config::EdgeNoLabel]))
    }
}
