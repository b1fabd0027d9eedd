//! Error types for room and blob operations.

use thiserror::Error;

use loomboard_types::SessionCode;

/// Errors from the durable blob store.
#[derive(Error, Debug)]
pub enum BlobError {
    /// SQLite-backed store failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Any other backend failure.
    #[error("blob backend error: {0}")]
    Backend(String),
}

/// Errors from the room actor surface.
///
/// Not-found conditions are deliberately absent: missing shapes are
/// expressed as `None` or silent no-ops, never as errors.
#[derive(Error, Debug)]
pub enum RoomError {
    /// A data operation arrived before any `init` — a configuration
    /// error on the caller's side, never retried.
    #[error("room has no session code yet; init must run first")]
    NotInitialized,

    /// `init` with a conflicting code. A room serves one code for life.
    #[error("room already bound to session {current}, refusing {requested}")]
    CodeMismatch {
        current: SessionCode,
        requested: SessionCode,
    },

    /// The room was cleaned up; terminal.
    #[error("room is closed")]
    Closed,

    /// Blob storage failure during load, persist, or cleanup.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// Snapshot (de)serialization failure.
    #[error("snapshot serialization: {0}")]
    Snapshot(#[from] serde_json::Error),
}
