//! The record store: id → record map, document clock, change events.

use indexmap::IndexMap;
use tokio::sync::broadcast;

use loomboard_types::{Record, RecordId};

use crate::snapshot::RoomSnapshot;

/// Broadcast channel capacity for change events.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One mutation inside a committed batch.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordChange {
    /// Insert or full replacement.
    Put(Record),
    /// Removal by id.
    Delete(RecordId),
}

/// A committed batch, broadcast to all subscribers.
#[derive(Clone, Debug)]
pub struct StoreEvent {
    /// Clock value after the batch landed.
    pub clock: u64,
    /// The mutations that landed (no-op deletes are filtered out).
    pub changes: Vec<RecordChange>,
}

struct StoredRecord {
    record: Record,
    /// Clock value of the batch that last touched this record.
    last_changed: u64,
}

/// Authoritative in-memory map from record id to record.
///
/// Single-writer: owned by one room actor behind a write lock. The clock
/// increments once per committed batch and is monotonically non-decreasing
/// for every reader.
pub struct RecordStore {
    records: IndexMap<RecordId, StoredRecord>,
    clock: u64,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl RecordStore {
    /// Create an empty store at clock zero.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: IndexMap::new(),
            clock: 0,
            event_tx,
        }
    }

    /// Rebuild a store from a persisted snapshot.
    ///
    /// Loaded records report the snapshot clock as their last change.
    pub fn from_snapshot(snapshot: RoomSnapshot) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let clock = snapshot.clock;
        let records = snapshot
            .records
            .into_iter()
            .map(|record| {
                (
                    record.id().clone(),
                    StoredRecord {
                        record,
                        last_changed: clock,
                    },
                )
            })
            .collect();
        Self {
            records,
            clock,
            event_tx,
        }
    }

    /// Subscribe to committed batches.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    /// Get a record by id. Absence is not an error.
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id).map(|s| &s.record)
    }

    /// Check whether a record exists.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    /// Insert or fully replace one record.
    pub fn put(&mut self, record: Record) {
        self.apply(vec![RecordChange::Put(record)]);
    }

    /// Delete one record. Deleting an absent id is a no-op.
    pub fn delete(&mut self, id: &RecordId) {
        self.apply(vec![RecordChange::Delete(id.clone())]);
    }

    /// Apply a batch of mutations atomically: one clock increment, one
    /// broadcast event. No-op deletes are dropped; a batch that ends up
    /// empty leaves the clock untouched.
    pub fn apply(&mut self, changes: Vec<RecordChange>) {
        let effective: Vec<RecordChange> = changes
            .into_iter()
            .filter(|change| match change {
                RecordChange::Put(_) => true,
                RecordChange::Delete(id) => self.records.contains_key(id),
            })
            .collect();

        if effective.is_empty() {
            return;
        }

        self.clock += 1;
        let clock = self.clock;
        for change in &effective {
            match change {
                RecordChange::Put(record) => {
                    self.records.insert(
                        record.id().clone(),
                        StoredRecord {
                            record: record.clone(),
                            last_changed: clock,
                        },
                    );
                }
                RecordChange::Delete(id) => {
                    // shift_remove keeps snapshot ordering stable.
                    self.records.shift_remove(id);
                }
            }
        }

        // Nobody listening is fine; the send result is irrelevant.
        let _ = self.event_tx.send(StoreEvent {
            clock,
            changes: effective,
        });
    }

    /// Full, consistent point-in-time export: every record with the clock
    /// value of its last change, in stable insertion order.
    pub fn snapshot(&self) -> Vec<(Record, u64)> {
        self.records
            .values()
            .map(|s| (s.record.clone(), s.last_changed))
            .collect()
    }

    /// The current document clock.
    pub fn current_clock(&self) -> u64 {
        self.clock
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomboard_types::ShapeRecord;

    fn shape(id: &str) -> Record {
        let mut s = ShapeRecord::new("geo");
        s.id = RecordId::from_raw(id);
        Record::Shape(s)
    }

    #[test]
    fn test_put_get_delete() {
        let mut store = RecordStore::new();
        store.put(shape("shape:a"));

        assert!(store.contains(&RecordId::from_raw("shape:a")));
        assert_eq!(store.current_clock(), 1);

        store.delete(&RecordId::from_raw("shape:a"));
        assert!(store.get(&RecordId::from_raw("shape:a")).is_none());
        assert_eq!(store.current_clock(), 2);
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut store = RecordStore::new();
        store.delete(&RecordId::from_raw("shape:ghost"));
        // No clock movement, no event.
        assert_eq!(store.current_clock(), 0);
    }

    #[test]
    fn test_batch_is_single_clock_increment() {
        let mut store = RecordStore::new();
        store.apply(vec![
            RecordChange::Put(shape("shape:a")),
            RecordChange::Put(shape("shape:b")),
            RecordChange::Put(shape("shape:c")),
        ]);

        assert_eq!(store.current_clock(), 1);
        assert_eq!(store.len(), 3);
        for (_, last_changed) in store.snapshot() {
            assert_eq!(last_changed, 1);
        }
    }

    #[test]
    fn test_clock_monotonic_across_reads() {
        let mut store = RecordStore::new();
        let mut last = store.current_clock();
        for i in 0..10 {
            store.put(shape(&format!("shape:{i}")));
            let now = store.current_clock();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_snapshot_insertion_order() {
        let mut store = RecordStore::new();
        store.put(shape("shape:a"));
        store.put(shape("shape:b"));
        store.put(shape("shape:c"));
        store.delete(&RecordId::from_raw("shape:b"));
        store.put(shape("shape:d"));

        let ids: Vec<String> = store
            .snapshot()
            .into_iter()
            .map(|(r, _)| r.id().as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["shape:a", "shape:c", "shape:d"]);
    }

    #[test]
    fn test_events_carry_effective_changes() {
        let mut store = RecordStore::new();
        let mut rx = store.subscribe();

        store.apply(vec![
            RecordChange::Put(shape("shape:a")),
            RecordChange::Delete(RecordId::from_raw("shape:ghost")),
        ]);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.clock, 1);
        // The no-op delete was filtered out.
        assert_eq!(event.changes.len(), 1);
        assert!(matches!(&event.changes[0], RecordChange::Put(r) if r.id().as_str() == "shape:a"));
    }

    #[test]
    fn test_replace_is_full_replacement() {
        let mut store = RecordStore::new();
        let mut first = ShapeRecord::new("geo");
        first.id = RecordId::from_raw("shape:a");
        let first = first.with_prop("w", 100);
        store.put(Record::Shape(first));

        let mut second = ShapeRecord::new("text");
        second.id = RecordId::from_raw("shape:a");
        store.put(Record::Shape(second.clone()));

        let got = store.get(&RecordId::from_raw("shape:a")).unwrap();
        assert_eq!(got.as_shape().unwrap().shape_type, "text");
        // Old props do not survive a full put.
        assert!(got.as_shape().unwrap().props.is_empty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut store = RecordStore::new();
        store.put(shape("shape:a"));
        store.put(shape("shape:b"));

        let snap = RoomSnapshot::of(&store, None);
        let restored = RecordStore::from_snapshot(snap);
        assert_eq!(restored.current_clock(), 2);
        assert_eq!(restored.len(), 2);
        assert!(restored.contains(&RecordId::from_raw("shape:b")));
    }
}
