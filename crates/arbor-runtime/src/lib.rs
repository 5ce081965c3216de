//! Frame-by-frame evaluation of `arbor-core` computations.
//!
//! The [`Driver`] is the only owner of run-time state: models, the effect
//! and action queues, and the memo tables that let an unchanged subtree
//! keep its previous output.

pub mod config;
pub mod driver;
pub mod error;
mod eval;
pub mod trace;

pub use config::DriverConfig;
pub use driver::Driver;
pub use error::RuntimeError;
pub use trace::TraceEntry;
