//! Persistence for arbor graph snapshots.
//!
//! Provides the stable, versioned snapshot schema ([`stable`]), conversion
//! from in-memory [`arbor_core::GraphSnapshot`]s, content hashing, and the
//! [`SnapshotStore`] trait with [`InMemoryStore`] and [`SqliteStore`]
//! backends.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: SnapshotId, SnapshotSummary storage-layer types
//! - [`stable`]: v1/v2 records, up/downgrade and the versioned envelope
//! - [`convert`]: GraphSnapshot to and from the stable schema
//! - [`hash`]: blake3 content hashes
//! - [`traits`]: SnapshotStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: migration setup for SQLite
//! - [`sqlite`]: SqliteStore implementation

pub mod convert;
pub mod error;
pub mod hash;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod stable;
pub mod traits;
pub mod types;

pub use convert::{snapshot_to_stable, stable_to_snapshot};
pub use error::StorageError;
pub use hash::{content_hash, hash_graph};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use stable::{downgrade, upgrade, upgrade_with_ids, VersionedGraph, LATEST_VERSION, MISSING_ID};
pub use traits::SnapshotStore;
pub use types::{SnapshotId, SnapshotSummary};
