//! Persisted form of a room's record store.
//!
//! One JSON blob per session. The session code travels inside the blob so
//! a restarted process can re-bind a room to its code without a separate
//! metadata read.

use serde::{Deserialize, Serialize};

use loomboard_types::{Record, SessionCode};

use crate::store::RecordStore;

/// Serializable point-in-time state of one room.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// The session code this blob belongs to, if the room was initialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<SessionCode>,
    /// Document clock at snapshot time.
    pub clock: u64,
    /// Every record, in stable store order.
    pub records: Vec<Record>,
}

impl RoomSnapshot {
    /// Capture the current state of a store.
    pub fn of(store: &RecordStore, code: Option<SessionCode>) -> Self {
        Self {
            code,
            clock: store.current_clock(),
            records: store.snapshot().into_iter().map(|(r, _)| r).collect(),
        }
    }

    /// Serialize for blob storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from blob storage.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
