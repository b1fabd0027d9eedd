//! Session code → room actor registry.
//!
//! The explicit reimplementation of a durable-object-per-name primitive:
//! exactly one `Arc<Room>` per code for the process lifetime, created on
//! first contact and idempotently bound to its code. After a restart the
//! registry is empty; the first contact for a code re-creates the room,
//! which reloads its state from the blob store.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use loomboard_types::SessionCode;

use crate::blob::{BlobStore, blob_key};
use crate::error::RoomError;
use crate::persist::DEFAULT_PERSIST_INTERVAL;
use crate::room::Room;

/// Process-wide map from session code to its single room actor.
pub struct RoomRegistry {
    rooms: DashMap<SessionCode, Arc<Room>>,
    blob: Arc<dyn BlobStore>,
    persist_interval: Duration,
}

impl RoomRegistry {
    /// Create a registry over the given blob store.
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self::with_persist_interval(blob, DEFAULT_PERSIST_INTERVAL)
    }

    /// Create a registry with a custom per-room persistence interval.
    pub fn with_persist_interval(blob: Arc<dyn BlobStore>, persist_interval: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            blob,
            persist_interval,
        }
    }

    /// The room for a code, created and bound on first contact.
    ///
    /// Concurrent callers for the same code receive the same `Arc<Room>`;
    /// the redundant `init` calls are idempotent.
    pub async fn get_or_create(&self, code: &SessionCode) -> Result<Arc<Room>, RoomError> {
        let room = self
            .rooms
            .entry(code.clone())
            .or_insert_with(|| {
                Arc::new(Room::with_persist_interval(
                    self.blob.clone(),
                    self.persist_interval,
                ))
            })
            .value()
            .clone();
        room.init(code.clone()).await?;
        Ok(room)
    }

    /// The room for a code, only if resident.
    pub fn get(&self, code: &SessionCode) -> Option<Arc<Room>> {
        self.rooms.get(code).map(|r| r.value().clone())
    }

    /// Close a session: tear down its room (if resident) and delete its
    /// blob either way.
    pub async fn cleanup(&self, code: &SessionCode) -> Result<(), RoomError> {
        match self.rooms.remove(code) {
            Some((_, room)) => room.cleanup().await,
            None => {
                // Not resident; the durable blob may still exist.
                self.blob.delete(&blob_key(code)).await?;
                Ok(())
            }
        }
    }

    /// Number of resident rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms are resident.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
