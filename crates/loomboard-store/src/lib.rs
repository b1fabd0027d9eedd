//! Authoritative in-memory record storage for one session document.
//!
//! The [`RecordStore`] is a keyed map from record id to [`Record`] plus a
//! document clock. It is owned by exactly one room actor and mutated only
//! through that actor (single-writer discipline); everything else observes
//! it through snapshots and broadcast change events.
//!
//! # Concurrency Model
//!
//! - The store itself is a plain struct; the owning actor wraps it in a
//!   `tokio::sync::RwLock`.
//! - Change events go out over a `tokio::sync::broadcast` channel, consumed
//!   by the persistence throttle and the client fan-out.
//! - Batches land atomically: one clock increment, one event, and no reader
//!   can observe a half-applied batch.

pub mod snapshot;
pub mod store;

pub use snapshot::RoomSnapshot;
pub use store::{RecordChange, RecordStore, StoreEvent};
