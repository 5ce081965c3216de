//! Storage error types for arbor-storage.
//!
//! [`StorageError`] covers serialization, schema-version mismatches, missing
//! snapshots and backend failures.

use arbor_core::CoreError;
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A snapshot with the given ID was not found.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(i64),

    /// The record carries a schema version with no defined conversion.
    #[error("unsupported snapshot schema version {found} (supported: 1, 2)")]
    UnsupportedVersion { found: u64 },

    /// The versioned envelope is not `{"version": n, "graph": ...}`.
    #[error("malformed snapshot envelope: {reason}")]
    MalformedEnvelope { reason: String },

    /// A stored path or node record does not map back onto a graph snapshot.
    #[error("invalid snapshot record: {0}")]
    InvalidRecord(#[from] CoreError),

    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),
}
