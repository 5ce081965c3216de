//! Incremental computation graphs with local state.
//!
//! Applications describe their state and derived data as a tree of
//! [`Computation`]s over time-varying [`Value`]s. Building the tree is pure;
//! a driver (see the `arbor-runtime` crate) evaluates it frame by frame,
//! owns the per-node models and runs the [`Effect`]s that inject functions
//! produce.

pub mod assoc;
pub mod computation;
pub mod edge;
pub mod effect;
pub mod error;
pub mod graph_info;
pub mod id;
pub mod key;
pub mod location;
pub mod path;
pub mod pipe;
pub mod scope;
pub mod state;
pub mod switch;
pub mod transform;
pub mod value;
pub mod var;
pub mod wrap;

// Re-export commonly used types
pub use assoc::{assoc, assoc_on, assoc_simpl, scope_model};
pub use computation::{Computation, ComputationKind, ComputationNode};
pub use edge::{lifecycle, mirror, on_change, on_change_with_prev, Lifecycle};
pub use effect::{ApplyCtx, Callback, Effect, Inject, Scheduler};
pub use error::CoreError;
pub use graph_info::{iter_graph_updates, GraphSnapshot, GraphUpdate, NodeInfo};
pub use id::{NodeId, VarId};
pub use key::Key;
pub use location::SourceLocation;
pub use path::{NodePath, PathElem};
pub use pipe::pipe;
pub use scope::DynamicVar;
pub use state::{actor0, actor1, id_gen, state, state_machine0, state_machine1, state_opt, toggle};
pub use switch::{switch, switch_enum, Enumerable};
pub use transform::{transform, Environment, VisitCtx, Visitor};
pub use value::{downcast, map2, map3, map4, map5, map6, map7, Dyn, Value, ValueKind, ValueNode};
pub use var::Var;
pub use wrap::{with_inject_fixed_point, with_model_resetter, wrap};
