//! Durable blob storage for room snapshots.
//!
//! One blob per session, keyed `workspace/<code>`. Used only for cold
//! load and throttled snapshot persistence — never read on the hot path.
//!
//! Two implementations: [`MemoryBlobStore`] (tests, ephemeral dev) and
//! [`SqliteBlobStore`] (single-node durable storage, key/value table in
//! the style of the rest of our SQLite persistence).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::{Connection, params};

use loomboard_types::SessionCode;

use crate::error::BlobError;

/// The blob key for a session's snapshot.
pub fn blob_key(code: &SessionCode) -> String {
    format!("workspace/{}", code.as_str())
}

/// External durable key/value blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob. Absence is not an error.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Store (insert or overwrite) a blob.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError>;

    /// Delete a blob. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// In-memory blob store with call counters.
///
/// The counters let tests assert the single-load and throttled-persist
/// guarantees without mocking.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
    gets: AtomicU64,
    puts: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls observed.
    pub fn get_calls(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `put` calls observed.
    pub fn put_calls(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    /// Peek at a stored blob without counting a `get`.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.get(key).map(|b| b.value().clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.blobs.get(key).map(|b| b.value().clone()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.blobs.remove(key);
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blobs (
    key TEXT PRIMARY KEY,
    bytes BLOB NOT NULL,
    updated_at INTEGER DEFAULT (unixepoch())
);
"#;

/// SQLite-backed blob store. One row per session snapshot.
pub struct SqliteBlobStore {
    conn: Arc<std::sync::Mutex<Connection>>,
}

impl SqliteBlobStore {
    /// Open (or create) the blob database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlobError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (dev/test convenience).
    pub fn open_in_memory() -> Result<Self, BlobError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, BlobError> {
        self.conn
            .lock()
            .map_err(|e| BlobError::Backend(format!("blob db lock poisoned: {e}")))
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT bytes FROM blobs WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO blobs (key, bytes, updated_at) VALUES (?1, ?2, unixepoch())
             ON CONFLICT(key) DO UPDATE SET bytes = excluded.bytes, updated_at = excluded.updated_at",
            params![key, bytes],
        )?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM blobs WHERE key = ?1", params![key])?;
        Ok(())
    }
}
