//! Throttled snapshot persistence.
//!
//! A leading + coalescing throttle, not a debounce: the first mutation
//! after a quiet period is written out promptly; bursts inside the
//! interval coalesce into a single write at the interval boundary; the
//! write always serializes the state *at write time*, never the state at
//! the moment the window opened.
//!
//! The flusher task is spawned by the room's load path, so it can never
//! persist an empty store over a real blob during the load race.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use loomboard_store::{RecordStore, RoomSnapshot};
use loomboard_types::SessionCode;

use crate::blob::BlobStore;

/// Interval between snapshot writes.
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(10);

/// Mutation-to-flusher signal: a dirty flag plus a wakeup.
#[derive(Default)]
pub struct PersistSignal {
    dirty: AtomicBool,
    notify: Notify,
}

impl PersistSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the store dirty and wake the flusher.
    pub fn mark(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Clear the dirty flag, returning whether it was set.
    fn take(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    async fn wakeup(&self) {
        self.notify.notified().await;
    }
}

/// Run the persistence flusher until cancelled.
///
/// Writes at most once per `interval`, and always writes when at least
/// one mutation happened since the last write. A failed write re-marks
/// the signal so the next interval retries.
pub async fn run_flusher(
    blob: Arc<dyn BlobStore>,
    key: String,
    code: SessionCode,
    store: Arc<RwLock<RecordStore>>,
    signal: Arc<PersistSignal>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut last_write: Option<Instant> = None;
    let mut persisted_clock: Option<u64> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = signal.wakeup() => {}
        }

        // Throttle: hold the write until the interval boundary.
        if let Some(written_at) = last_write {
            let since = written_at.elapsed();
            if since < interval {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval - since) => {}
                }
            }
        }

        // Clear before snapshotting: mutations landing after this point
        // re-mark and get their own write next interval.
        if !signal.take() {
            continue;
        }

        let snapshot = {
            let store = store.read().await;
            RoomSnapshot::of(&store, Some(code.clone()))
        };

        // Stale wakeups (marks already covered by the last write) are
        // dropped by clock comparison, not by trusting the dirty flag.
        if persisted_clock == Some(snapshot.clock) {
            continue;
        }

        let bytes = match snapshot.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%code, error = %e, "failed to serialize room snapshot");
                continue;
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = blob.put(&key, bytes) => {
                if let Err(e) = result {
                    warn!(%code, error = %e, "snapshot write failed; will retry");
                    signal.mark();
                } else {
                    debug!(%code, clock = snapshot.clock, "persisted room snapshot");
                    persisted_clock = Some(snapshot.clock);
                }
            }
        }

        last_write = Some(Instant::now());
    }
}
