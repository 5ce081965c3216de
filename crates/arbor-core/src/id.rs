//! Stable ID newtypes for graph entities.
//!
//! All IDs are distinct newtype wrappers over `u32`, providing type safety
//! so that a `NodeId` cannot be accidentally used where a `VarId` is expected.
//! Both are allocated from monotonic counters, so an id handed out once is
//! never handed out again for the lifetime of the process.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(0);
static NEXT_VAR_ID: AtomicU32 = AtomicU32::new(0);

/// Identity of a single `Value` or `Computation` node.
///
/// Node identity, not structural equality, is what tells two uses of the
/// same node apart from two equal-looking nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identity of a variable introduced by a binding site (`sub`, `assoc`,
/// `wrap`, `store`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl NodeId {
    /// Allocates a node id that has never been returned before.
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl VarId {
    /// Allocates a variable id that has never been returned before.
    pub fn fresh() -> Self {
        VarId(NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_node_ids_are_unique() {
        let a = NodeId::fresh();
        let b = NodeId::fresh();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn fresh_var_ids_are_unique() {
        let ids: Vec<VarId> = (0..16).map(|_| VarId::fresh()).collect();
        let mut sorted = ids.clone();
        sorted.dedup();
        assert_eq!(ids.len(), sorted.len());
    }

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(7)), "7");
    }

    #[test]
    fn var_id_display() {
        assert_eq!(format!("{}", VarId(99)), "99");
    }

    #[test]
    fn serde_roundtrip() {
        let node = NodeId(42);
        let json = serde_json::to_string(&node).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);

        let var = VarId(7);
        let json = serde_json::to_string(&var).unwrap();
        let back: VarId = serde_json::from_str(&json).unwrap();
        assert_eq!(var, back);
    }
}
