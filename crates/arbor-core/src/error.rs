//! Core error types for arbor-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Every variant
//! here is a structural defect in graph construction or traversal, never a
//! user input error: a well-formed graph built through the public
//! constructors does not produce any of them.

use thiserror::Error;

use crate::id::{NodeId, VarId};
use crate::location::SourceLocation;

/// Renders an optional location for error messages.
pub(crate) fn fmt_here(here: &Option<SourceLocation>) -> String {
    match here {
        Some(loc) => loc.to_string(),
        None => "<unknown>".to_string(),
    }
}

/// Core errors produced by the arbor-core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A named value refers to a variable no enclosing binder introduced.
    #[error("unresolved variable {var} at {path} ({here})", here = fmt_here(here))]
    UnresolvedVariable {
        var: VarId,
        path: String,
        here: Option<SourceLocation>,
    },

    /// An erased payload did not have the type its node was built for.
    #[error("type mismatch: expected {expected}")]
    TypeMismatch { expected: &'static str },

    /// A variadic node was handed the wrong number of inputs.
    #[error("arity mismatch at node {node}: expected {expected}, got {got}")]
    ArityMismatch {
        node: NodeId,
        expected: usize,
        got: usize,
    },

    /// A node has more children than a path can address.
    #[error("child slot {index} of {path} is out of range")]
    TooManyChildren { path: String, index: usize },

    /// A path string could not be parsed.
    #[error("invalid node path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The dependency graph of a snapshot contains a cycle.
    #[error("dependency cycle through {path}")]
    DependencyCycle { path: String },

    /// A transition that reads an input was applied without one.
    #[error("state machine at {path} was applied without its input")]
    MissingInput { path: String },

    /// Two entries of an `assoc_on` collection derived the same model key.
    #[error("duplicate model key {key} in assoc_on ({here})", here = fmt_here(here))]
    DuplicateModelKey {
        key: String,
        here: Option<SourceLocation>,
    },

    /// A scoped computation produced no result for its key.
    #[error("scoped computation produced no result ({here})", here = fmt_here(here))]
    EmptyScope { here: Option<SourceLocation> },
}
