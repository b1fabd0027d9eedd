//! Incremental streaming materialization.
//!
//! A generation turn receives a sequence of growing partial JSON
//! fragments describing an explanation and a list of in-progress nodes
//! (each with growing text and a growing list of prediction suggestions).
//! This crate converts that sequence into an ordered, diff-only event
//! stream for one push-channel subscriber and, on completion, commits the
//! finished records through the room actor's RPC surface.
//!
//! ```text
//! GenerativeBackend ──deltas──▶ buffer ──parse_partial──▶ GeneratedDoc
//!                                                             │
//!                                      TurnState::apply ──────┤
//!                                                             ▼
//!                PushChannel ◀──TurnEvent (suffix diffs, ordered)
//!                                                             │ stream end
//!                                      TurnState::finalize ───┤
//!                                                             ▼
//!                          Room::add_records (commit before `complete`)
//! ```

pub mod coordinator;
pub mod error;
pub mod events;
pub mod partial;
pub mod turn;

pub use coordinator::{
    ChatMessage, FragmentStream, GenerateRequest, GenerativeBackend, PushChannel, TurnCoordinator,
};
pub use error::{BackendError, TurnError};
pub use events::{FinalNode, FinalPrediction, TurnEvent};
pub use partial::{GeneratedDoc, GeneratedNode, parse_partial};
pub use turn::{FinalizedTurn, TurnState};
