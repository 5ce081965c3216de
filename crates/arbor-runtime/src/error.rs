//! Runtime error types for the driver.
//!
//! Structural defects found while evaluating a frame carry the source
//! location of the offending node when one was recorded.

use arbor_core::{CoreError, NodePath, SourceLocation, VarId};

fn fmt_here(here: &Option<SourceLocation>) -> String {
    match here {
        Some(loc) => loc.to_string(),
        None => "<unknown>".to_string(),
    }
}

/// Errors produced while driving a computation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("unbound variable {var} at {path} ({here})", here = fmt_here(here))]
    UnboundVariable {
        var: VarId,
        path: NodePath,
        here: Option<SourceLocation>,
    },

    #[error("switch at {path} selected arm {index} of {arms} ({here})", here = fmt_here(here))]
    SwitchOutOfRange {
        path: NodePath,
        index: usize,
        arms: usize,
        here: Option<SourceLocation>,
    },

    #[error("lazy node at {path} forced itself while being built ({here})", here = fmt_here(here))]
    LazyCycle {
        path: NodePath,
        here: Option<SourceLocation>,
    },

    #[error("actions kept arriving after {rounds} rounds; giving up")]
    ActionLoop { rounds: usize },

    #[error("work still pending after {flushes} flushes")]
    NotSettled { flushes: usize },

    #[error(transparent)]
    Core(#[from] CoreError),
}
