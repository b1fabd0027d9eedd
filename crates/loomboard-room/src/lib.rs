//! The per-session room actor.
//!
//! One [`Room`] exists per session code for the lifetime of the process —
//! the explicit registry reimplementation of a durable-object-per-name
//! primitive. The room is the sole owner of its record store: every
//! mutation routes through the room's RPC surface, which is what makes
//! concurrent callers (connected clients, streaming turns) safe without
//! any locking discipline on their side.
//!
//! # Architecture
//!
//! - **Room**: lifecycle state machine (uninitialized → ready → closed),
//!   memoized single load from blob storage, mutation surface, fan-out.
//! - **RoomRegistry**: session code → `Arc<Room>`, created on first use.
//! - **BlobStore**: durable snapshot storage collaborator (in-memory and
//!   SQLite implementations).
//! - **Persistence**: a leading + coalescing throttle task per room; at
//!   most one snapshot write per interval, always of the latest state.

pub mod blob;
pub mod error;
pub mod fanout;
pub mod persist;
pub mod registry;
pub mod room;

pub use blob::{BlobStore, MemoryBlobStore, SqliteBlobStore, blob_key};
pub use error::{BlobError, RoomError};
pub use fanout::ClientConn;
pub use persist::DEFAULT_PERSIST_INTERVAL;
pub use registry::RoomRegistry;
pub use room::Room;
