//! Structural node paths.
//!
//! A [`NodePath`] names a position in a computation tree: the sequence of
//! child slots taken from the root, plus the `assoc` key for every keyed
//! replica on the way. The driver keys model storage by path and the
//! transform engine keys graph snapshots by path; both number children the
//! same way, so a path observed at run time lines up with the snapshot.
//!
//! Text form: `root`, then `.n` for every child slot and `[key]` for every
//! key, e.g. `root.1.1[3].0`. Only key-free paths can be parsed back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::key::Key;

/// One step of a [`NodePath`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathElem {
    /// The n-th child slot of a node.
    Child(u16),
    /// The replica for one key of an `assoc`.
    Key(Key),
}

/// Position of a node in a computation tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(SmallVec<[PathElem; 8]>);

impl NodePath {
    /// The path of the root node.
    pub fn root() -> Self {
        NodePath(SmallVec::new())
    }

    /// Path of the `index`-th child of this node.
    pub fn child(&self, index: u16) -> Self {
        let mut elems = self.0.clone();
        elems.push(PathElem::Child(index));
        NodePath(elems)
    }

    /// Like [`NodePath::child`] for a slot computed at run time. Fails if the
    /// slot does not fit a child index.
    pub fn child_at(&self, index: usize) -> Result<Self, CoreError> {
        let slot = u16::try_from(index).map_err(|_| CoreError::TooManyChildren {
            path: self.to_string(),
            index,
        })?;
        Ok(self.child(slot))
    }

    /// Path of the replica for `key` below this node.
    pub fn key(&self, key: Key) -> Self {
        let mut elems = self.0.clone();
        elems.push(PathElem::Key(key));
        NodePath(elems)
    }

    pub fn elems(&self) -> &[PathElem] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The enclosing path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        let mut elems = self.0.clone();
        elems.pop();
        Some(NodePath(elems))
    }

    /// Returns `true` if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns `true` if the path contains no `assoc` keys.
    pub fn is_structural(&self) -> bool {
        self.0.iter().all(|e| matches!(e, PathElem::Child(_)))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("root")?;
        for elem in &self.0 {
            match elem {
                PathElem::Child(i) => write!(f, ".{}", i)?,
                PathElem::Key(k) => write!(f, "[{}]", k)?,
            }
        }
        Ok(())
    }
}

impl FromStr for NodePath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidPath {
            path: s.to_string(),
            reason: reason.to_string(),
        };

        let rest = s
            .strip_prefix("root")
            .ok_or_else(|| invalid("missing 'root' prefix"))?;
        if rest.contains('[') {
            return Err(invalid("keyed paths cannot be parsed"));
        }
        if rest.is_empty() {
            return Ok(NodePath::root());
        }
        let rest = rest
            .strip_prefix('.')
            .ok_or_else(|| invalid("expected '.' after 'root'"))?;

        let mut elems = SmallVec::new();
        for segment in rest.split('.') {
            let index: u16 = segment
                .parse()
                .map_err(|_| invalid("child index is not a number"))?;
            elems.push(PathElem::Child(index));
        }
        Ok(NodePath(elems))
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
