//! The room actor: single owner of one session's record store.
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized ──init(code)──▶ Ready (store unloaded)
//!                                  │ first data op / connect
//!                                  ▼
//!                              Ready (store loaded, fan-out + flusher live)
//!                                  │ cleanup()
//!                                  ▼
//!                               Closed (terminal)
//! ```
//!
//! The store loads at most once: concurrent first-touch callers all await
//! the same load (the slot mutex is held across the blob fetch), so a
//! burst of 50 connects performs exactly one blob `get`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use loomboard_store::{RecordChange, RecordStore, RoomSnapshot};
use loomboard_types::{
    ClientId, Record, RecordId, SessionCode, ShapePatch, ShapeRecord, UpdateShapesOptions,
};

use crate::blob::{BlobStore, blob_key};
use crate::error::RoomError;
use crate::fanout::{ClientConn, run_forwarder};
use crate::persist::{DEFAULT_PERSIST_INTERVAL, PersistSignal, run_flusher};

type StoreHandle = Arc<RwLock<RecordStore>>;

#[derive(Default)]
struct RoomMeta {
    code: Option<SessionCode>,
    closed: bool,
}

/// One collaboration session's actor.
///
/// All mutations route through this surface; nothing else ever holds a
/// writable reference to the record store.
pub struct Room {
    blob: Arc<dyn BlobStore>,
    persist_interval: Duration,
    meta: RwLock<RoomMeta>,
    /// Memoized store slot. The mutex is held across the load so that
    /// concurrent first-touch callers await one load instead of racing.
    slot: Mutex<Option<StoreHandle>>,
    clients: Arc<DashMap<ClientId, Arc<dyn ClientConn>>>,
    signal: Arc<PersistSignal>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("clients", &self.clients.len())
            .field("persist_interval", &self.persist_interval)
            .finish()
    }
}

impl Room {
    /// Create an uninitialized room over the given blob store.
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self::with_persist_interval(blob, DEFAULT_PERSIST_INTERVAL)
    }

    /// Create a room with a custom persistence interval.
    pub fn with_persist_interval(blob: Arc<dyn BlobStore>, persist_interval: Duration) -> Self {
        Self {
            blob,
            persist_interval,
            meta: RwLock::new(RoomMeta::default()),
            slot: Mutex::new(None),
            clients: Arc::new(DashMap::new()),
            signal: Arc::new(PersistSignal::new()),
            shutdown: CancellationToken::new(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bind this room to a session code. Idempotent for the same code;
    /// a conflicting code is a protocol violation and fails the call.
    pub async fn init(&self, code: SessionCode) -> Result<(), RoomError> {
        let mut meta = self.meta.write().await;
        if meta.closed {
            return Err(RoomError::Closed);
        }
        match &meta.code {
            Some(current) if *current == code => Ok(()),
            Some(current) => {
                error!(%current, requested = %code, "init with conflicting session code");
                Err(RoomError::CodeMismatch {
                    current: current.clone(),
                    requested: code,
                })
            }
            None => {
                debug!(%code, "room initialized");
                meta.code = Some(code);
                Ok(())
            }
        }
    }

    /// The bound session code, if initialized.
    pub async fn code(&self) -> Option<SessionCode> {
        self.meta.read().await.code.clone()
    }

    /// Whether `cleanup` has run.
    pub async fn is_closed(&self) -> bool {
        self.meta.read().await.closed
    }

    /// Tear the room down: discard the store, delete the blob, stop the
    /// background tasks. Terminal and idempotent.
    pub async fn cleanup(&self) -> Result<(), RoomError> {
        let code = {
            let mut meta = self.meta.write().await;
            if meta.closed {
                return Ok(());
            }
            meta.closed = true;
            meta.code.take()
        };

        self.shutdown.cancel();
        *self.slot.lock().await = None;
        self.clients.clear();

        if let Some(code) = code {
            self.blob.delete(&blob_key(&code)).await?;
            debug!(%code, "room cleaned up");
        }
        Ok(())
    }

    /// Get the loaded store, loading it on first touch.
    async fn store_handle(&self) -> Result<StoreHandle, RoomError> {
        let code = {
            let meta = self.meta.read().await;
            if meta.closed {
                return Err(RoomError::Closed);
            }
            meta.code.clone().ok_or(RoomError::NotInitialized)?
        };

        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let key = blob_key(&code);
        let store = match self.blob.get(&key).await? {
            Some(bytes) => match RoomSnapshot::from_bytes(&bytes) {
                Ok(snapshot) => {
                    debug!(%code, clock = snapshot.clock, records = snapshot.records.len(),
                        "loaded room from blob");
                    RecordStore::from_snapshot(snapshot)
                }
                Err(e) => {
                    // An unreadable snapshot is treated as absent rather
                    // than poisoning the session forever.
                    warn!(%code, error = %e, "unreadable snapshot; starting fresh");
                    RecordStore::new()
                }
            },
            None => {
                debug!(%code, "no snapshot; starting fresh");
                RecordStore::new()
            }
        };

        let handle = Arc::new(RwLock::new(store));

        // Change-hook consumers. Spawned only after a successful load so
        // the flusher can never write an empty store over a real blob.
        let events = handle.read().await.subscribe();
        tokio::spawn(run_forwarder(
            events,
            self.clients.clone(),
            self.signal.clone(),
            self.shutdown.child_token(),
        ));
        tokio::spawn(run_flusher(
            self.blob.clone(),
            key,
            code,
            handle.clone(),
            self.signal.clone(),
            self.persist_interval,
            self.shutdown.child_token(),
        ));

        *slot = Some(handle.clone());
        Ok(handle)
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Admit one client into the fan-out set.
    ///
    /// A connect that supplies a code while the room is uninitialized
    /// also performs the `init` transition (idempotent).
    pub async fn connect(
        &self,
        client_id: ClientId,
        code: Option<SessionCode>,
        conn: Arc<dyn ClientConn>,
    ) -> Result<(), RoomError> {
        if let Some(code) = code {
            self.init(code).await?;
        }
        // Ensure the shared store exists before the client starts syncing.
        self.store_handle().await?;
        self.clients.insert(client_id, conn);
        Ok(())
    }

    /// Drop one client from the fan-out set.
    pub fn disconnect(&self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    // ========================================================================
    // Record RPC surface
    // ========================================================================

    /// Fetch a shape by id.
    pub async fn get_shape(&self, id: &RecordId) -> Result<Option<ShapeRecord>, RoomError> {
        let handle = self.store_handle().await?;
        let store = handle.read().await;
        Ok(store.get(id).and_then(Record::as_shape).cloned())
    }

    /// Replace an existing shape. A missing target is a silent no-op.
    pub async fn update_shape(&self, record: ShapeRecord) -> Result<(), RoomError> {
        let handle = self.store_handle().await?;
        let mut store = handle.write().await;
        if store.contains(&record.id) {
            store.put(Record::Shape(record));
        }
        Ok(())
    }

    /// Merge a batch of shape patches atomically.
    ///
    /// Policy per patch: existing target → merge (full or keyed per
    /// `options.keys_to_merge`); absent target → create only when
    /// `options.create_if_missing` and the patch carries a type, else
    /// skip silently. `options.additional_records` land in the same
    /// batch; the whole call is one clock increment.
    pub async fn update_shapes(
        &self,
        patches: Vec<ShapePatch>,
        options: UpdateShapesOptions,
    ) -> Result<(), RoomError> {
        let handle = self.store_handle().await?;
        let mut store = handle.write().await;

        let mut changes = Vec::with_capacity(patches.len() + options.additional_records.len());
        for patch in patches {
            match store.get(&patch.id).and_then(Record::as_shape) {
                Some(existing) => {
                    let merged = match &options.keys_to_merge {
                        Some(keys) => patch.merged_onto_keyed(existing, keys),
                        None => patch.merged_onto(existing),
                    };
                    changes.push(RecordChange::Put(Record::Shape(merged)));
                }
                None if options.create_if_missing => match patch.into_record() {
                    Some(created) => changes.push(RecordChange::Put(Record::Shape(created))),
                    None => debug!("skipping typeless patch for missing shape"),
                },
                None => {
                    // Reference behavior: silently dropped, not an error.
                    debug!(id = %patch.id, "skipping patch for missing shape");
                }
            }
        }
        for record in options.additional_records {
            changes.push(RecordChange::Put(record));
        }

        store.apply(changes);
        Ok(())
    }

    /// Delete a shape. A missing target is a no-op.
    pub async fn remove_shape(&self, id: &RecordId) -> Result<(), RoomError> {
        let handle = self.store_handle().await?;
        let mut store = handle.write().await;
        store.delete(id);
        Ok(())
    }

    /// Delete a prediction shape together with the arrow its `arrowId`
    /// prop references, as one atomic pair-delete.
    pub async fn remove_prediction(&self, id: &RecordId) -> Result<(), RoomError> {
        let handle = self.store_handle().await?;
        let mut store = handle.write().await;

        let arrow_id = match store.get(id).and_then(Record::as_shape) {
            Some(shape) => shape.prop_str("arrowId").map(RecordId::from_raw),
            None => return Ok(()),
        };

        let mut changes = vec![RecordChange::Delete(id.clone())];
        if let Some(arrow_id) = arrow_id {
            changes.push(RecordChange::Delete(arrow_id));
        }
        store.apply(changes);
        Ok(())
    }

    /// Put records unconditionally, as one atomic batch.
    pub async fn add_records(&self, records: Vec<Record>) -> Result<(), RoomError> {
        let handle = self.store_handle().await?;
        let mut store = handle.write().await;
        store.apply(records.into_iter().map(RecordChange::Put).collect());
        Ok(())
    }

    /// Full point-in-time export with per-record last-changed clocks.
    pub async fn current_snapshot(&self) -> Result<Vec<(Record, u64)>, RoomError> {
        let handle = self.store_handle().await?;
        let store = handle.read().await;
        Ok(store.snapshot())
    }

    /// The current document clock.
    pub async fn current_clock(&self) -> Result<u64, RoomError> {
        let handle = self.store_handle().await?;
        let store = handle.read().await;
        Ok(store.current_clock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use loomboard_types::{JsonMap, MergeKeys};
    use serde_json::json;

    fn test_room() -> (Arc<MemoryBlobStore>, Room) {
        let blob = Arc::new(MemoryBlobStore::new());
        let room = Room::new(blob.clone() as Arc<dyn BlobStore>);
        (blob, room)
    }

    async fn ready_room() -> Room {
        let (_, room) = test_room();
        room.init(SessionCode::from_raw("s1")).await.unwrap();
        room
    }

    fn geo_shape(id: &str) -> ShapeRecord {
        let mut s = ShapeRecord::new("geo");
        s.id = RecordId::from_raw(id);
        s
    }

    #[tokio::test]
    async fn test_data_op_before_init_is_fatal() {
        let (_, room) = test_room();
        let err = room.current_clock().await.unwrap_err();
        assert!(matches!(err, RoomError::NotInitialized));
    }

    #[tokio::test]
    async fn test_init_idempotent_and_conflicting() {
        let (_, room) = test_room();
        room.init(SessionCode::from_raw("abc")).await.unwrap();
        room.init(SessionCode::from_raw("abc")).await.unwrap();

        let err = room.init(SessionCode::from_raw("other")).await.unwrap_err();
        assert!(matches!(err, RoomError::CodeMismatch { .. }));
        // The original binding survives the violation.
        assert_eq!(room.code().await.unwrap().as_str(), "abc");
    }

    #[tokio::test]
    async fn test_update_shape_missing_is_noop() {
        let room = ready_room().await;
        room.update_shape(geo_shape("shape:ghost")).await.unwrap();
        assert_eq!(room.current_clock().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_shapes_merge_policy() {
        let room = ready_room().await;

        let mut props = JsonMap::new();
        props.insert("a".into(), json!(1));
        props.insert("b".into(), json!(2));
        let mut shape = geo_shape("shape:x");
        shape.props = props;
        room.add_records(vec![Record::Shape(shape)]).await.unwrap();

        // Full merge: {a:1,b:2} ⊕ {b:3,c:4} → {a:1,b:3,c:4}
        let mut patch_props = JsonMap::new();
        patch_props.insert("b".into(), json!(3));
        patch_props.insert("c".into(), json!(4));
        room.update_shapes(
            vec![ShapePatch::props_only(
                RecordId::from_raw("shape:x"),
                patch_props.clone(),
            )],
            UpdateShapesOptions::default(),
        )
        .await
        .unwrap();

        let got = room.get_shape(&RecordId::from_raw("shape:x")).await.unwrap().unwrap();
        assert_eq!(got.props.get("a"), Some(&json!(1)));
        assert_eq!(got.props.get("b"), Some(&json!(3)));
        assert_eq!(got.props.get("c"), Some(&json!(4)));

        // Keyed merge onto a fresh shape: only props.c lands.
        let mut base = JsonMap::new();
        base.insert("a".into(), json!(1));
        base.insert("b".into(), json!(2));
        let mut fresh = geo_shape("shape:y");
        fresh.props = base;
        room.add_records(vec![Record::Shape(fresh)]).await.unwrap();

        room.update_shapes(
            vec![ShapePatch::props_only(RecordId::from_raw("shape:y"), patch_props)],
            UpdateShapesOptions {
                keys_to_merge: Some(MergeKeys {
                    keys: vec![],
                    props: vec!["c".into()],
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let got = room.get_shape(&RecordId::from_raw("shape:y")).await.unwrap().unwrap();
        assert_eq!(got.props.get("b"), Some(&json!(2)));
        assert_eq!(got.props.get("c"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_update_shapes_create_if_missing() {
        let room = ready_room().await;

        // No type → skipped even with create_if_missing.
        room.update_shapes(
            vec![ShapePatch::props_only(RecordId::from_raw("shape:a"), JsonMap::new())],
            UpdateShapesOptions {
                create_if_missing: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(room.get_shape(&RecordId::from_raw("shape:a")).await.unwrap().is_none());

        // Typed → created.
        room.update_shapes(
            vec![ShapePatch {
                id: RecordId::from_raw("shape:b"),
                shape_type: Some("text".into()),
                ..Default::default()
            }],
            UpdateShapesOptions {
                create_if_missing: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let created = room.get_shape(&RecordId::from_raw("shape:b")).await.unwrap().unwrap();
        assert_eq!(created.shape_type, "text");

        // Missing without create_if_missing → silent skip, no clock move.
        let clock = room.current_clock().await.unwrap();
        room.update_shapes(
            vec![ShapePatch::props_only(RecordId::from_raw("shape:c"), JsonMap::new())],
            UpdateShapesOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(room.current_clock().await.unwrap(), clock);
    }

    #[tokio::test]
    async fn test_update_shapes_batch_is_atomic() {
        let room = ready_room().await;
        room.add_records(vec![
            Record::Shape(geo_shape("shape:a")),
            Record::Shape(geo_shape("shape:b")),
        ])
        .await
        .unwrap();
        let clock = room.current_clock().await.unwrap();

        let mut props = JsonMap::new();
        props.insert("touched".into(), json!(true));
        room.update_shapes(
            vec![
                ShapePatch::props_only(RecordId::from_raw("shape:a"), props.clone()),
                ShapePatch::props_only(RecordId::from_raw("shape:b"), props),
            ],
            UpdateShapesOptions {
                additional_records: vec![Record::Shape(geo_shape("shape:extra"))],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // One batch, one increment, all three records landed together.
        assert_eq!(room.current_clock().await.unwrap(), clock + 1);
        assert!(room.get_shape(&RecordId::from_raw("shape:extra")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_prediction_pair_delete() {
        let room = ready_room().await;

        let arrow = geo_shape("shape:arrow-1");
        let prediction = ShapeRecord {
            id: RecordId::from_raw("shape:pred-1"),
            shape_type: "prediction".into(),
            parent_id: None,
            index: None,
            props: {
                let mut p = JsonMap::new();
                p.insert("arrowId".into(), json!("shape:arrow-1"));
                p
            },
        };
        room.add_records(vec![Record::Shape(arrow), Record::Shape(prediction)])
            .await
            .unwrap();
        let clock = room.current_clock().await.unwrap();

        room.remove_prediction(&RecordId::from_raw("shape:pred-1")).await.unwrap();

        assert!(room.get_shape(&RecordId::from_raw("shape:pred-1")).await.unwrap().is_none());
        assert!(room.get_shape(&RecordId::from_raw("shape:arrow-1")).await.unwrap().is_none());
        // Pair-delete is one atomic batch.
        assert_eq!(room.current_clock().await.unwrap(), clock + 1);

        // Removing a missing prediction is a no-op.
        room.remove_prediction(&RecordId::from_raw("shape:ghost")).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_from_existing_blob() {
        let blob = Arc::new(MemoryBlobStore::new());

        let mut store = RecordStore::new();
        store.put(Record::Shape(geo_shape("shape:persisted")));
        let snapshot = RoomSnapshot::of(&store, Some(SessionCode::from_raw("s1")));
        blob.put("workspace/s1", snapshot.to_bytes().unwrap()).await.unwrap();

        let room = Room::new(blob.clone() as Arc<dyn BlobStore>);
        room.init(SessionCode::from_raw("s1")).await.unwrap();
        let got = room.get_shape(&RecordId::from_raw("shape:persisted")).await.unwrap();
        assert!(got.is_some());
        assert_eq!(room.current_clock().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_is_terminal() {
        let (blob, room) = test_room();
        room.init(SessionCode::from_raw("s1")).await.unwrap();
        room.add_records(vec![Record::Shape(geo_shape("shape:a"))]).await.unwrap();

        room.cleanup().await.unwrap();
        assert!(room.is_closed().await);
        assert!(blob.peek("workspace/s1").is_none());

        // Data ops and re-init both fail once closed.
        assert!(matches!(room.current_clock().await.unwrap_err(), RoomError::Closed));
        assert!(matches!(
            room.init(SessionCode::from_raw("s1")).await.unwrap_err(),
            RoomError::Closed
        ));

        // Idempotent.
        room.cleanup().await.unwrap();
    }
}
