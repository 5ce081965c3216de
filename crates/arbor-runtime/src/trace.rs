//! Driver trace recording.
//!
//! When [`crate::DriverConfig::trace_enabled`] is set, the driver records a
//! [`TraceEntry`] for every action it applies or drops, every model reset
//! and every lifecycle transition, tagged with the frame it belongs to.

use arbor_core::NodePath;
use serde::Serialize;

/// One recorded driver event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEntry {
    ActionApplied { frame: u64, target: NodePath },
    /// The target was not active in the last frame.
    ActionDropped { frame: u64, target: NodePath },
    ModelsReset { frame: u64, scope: NodePath, discarded: usize },
    Activated { frame: u64, path: NodePath },
    Deactivated { frame: u64, path: NodePath },
}
