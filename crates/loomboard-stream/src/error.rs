//! Error types for generation turns.

use thiserror::Error;

use loomboard_room::RoomError;

/// Errors from the upstream generative backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The upstream request could not be issued or was rejected.
    #[error("upstream request failed: {0}")]
    Request(String),

    /// The upstream stream broke mid-turn.
    #[error("upstream stream interrupted: {0}")]
    Interrupted(String),

    /// The upstream call exceeded its deadline.
    #[error("upstream generation timed out")]
    Timeout,
}

/// Errors terminating a generation turn.
///
/// A turn error never touches the record store: partially streamed
/// content is only committed by a successful finalize.
#[derive(Error, Debug)]
pub enum TurnError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The accumulated completion never became a parsable document.
    #[error("completion did not parse as a generated document")]
    UnparsableCompletion,

    /// Committing finalized records failed.
    #[error(transparent)]
    Room(#[from] RoomError),
}
