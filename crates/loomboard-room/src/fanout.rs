//! Multi-client fan-out of committed mutations.
//!
//! Every committed batch must become visible to every connected client.
//! The wire protocol of convergence is a collaborator behind the
//! [`ClientConn`] seam; the room only guarantees that all clients observe
//! the same single record store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use loomboard_store::StoreEvent;
use loomboard_types::ClientId;

use crate::persist::PersistSignal;

/// A connected client's transport handle.
///
/// The sync-protocol layer implements this over its socket. `deliver`
/// returns `false` once the peer is gone; the room then prunes the entry.
#[async_trait]
pub trait ClientConn: Send + Sync {
    async fn deliver(&self, event: &StoreEvent) -> bool;
}

/// Forward store events to every connected client until cancelled.
///
/// Also marks the persistence signal dirty for each committed batch —
/// this task is the single consumer of the store's change hook.
pub async fn run_forwarder(
    mut events: broadcast::Receiver<StoreEvent>,
    clients: Arc<DashMap<ClientId, Arc<dyn ClientConn>>>,
    signal: Arc<PersistSignal>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Snapshots carry full state, so lagging only costs
                    // incremental updates; persist still sees dirty.
                    debug!(skipped, "fan-out lagged behind store events");
                    signal.mark();
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        signal.mark();

        // Collect first: delivery awaits must not hold map refs.
        let targets: Vec<(ClientId, Arc<dyn ClientConn>)> = clients
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (client_id, conn) in targets {
            if !conn.deliver(&event).await {
                trace!(%client_id, "pruning dead client connection");
                clients.remove(&client_id);
            }
        }
    }
}
