//! Sync coordinator: correlated sync requests with bounded completion.

use crate::errors::CbError;
use crate::sync::{SyncAck, SyncQueue, SyncRequest};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Turns whitelist mutations into correlated sync requests and exposes
/// bounded-time completion handles.
///
/// One coordinator runs per replica. The pending map is owned by the
/// coordinator and evicted on timeout so memory stays bounded.
pub struct SyncCoordinator {
    queue: Arc<dyn SyncQueue>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<()>>>,
    ack_timeout: Duration,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(queue: Arc<dyn SyncQueue>, ack_timeout: Duration) -> Self {
        Self {
            queue,
            pending: Mutex::new(HashMap::new()),
            ack_timeout,
        }
    }

    /// Ask the elected worker to sync the firewall with the current
    /// whitelist state.
    ///
    /// Resolves once a matching acknowledgment arrives, meaning the world
    /// state at some point after this call was durably synchronized — not
    /// necessarily that this specific mutation triggered the upstream call.
    ///
    /// # Errors
    ///
    /// `CbError::SyncTimeout` if no acknowledgment arrives within the
    /// configured deadline. That is "unknown", not "failed": the change may
    /// still converge on a later tick.
    pub async fn request_sync(&self) -> Result<(), CbError> {
        let request = SyncRequest { id: Uuid::new_v4() };
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request.id, tx);

        if let Err(e) = self.queue.enqueue(&request).await {
            self.pending.lock().await.remove(&request.id);
            return Err(e);
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(_) => {
                // Evict the handle so the pending map stays bounded.
                self.pending.lock().await.remove(&request.id);
                warn!(
                    target: "cb.sync.coordinator",
                    request_id = %request.id,
                    "Sync request not acknowledged within deadline"
                );
                Err(CbError::SyncTimeout)
            }
        }
    }

    /// Consume the broadcast acknowledgment stream and complete matching
    /// pending handles. Runs until cancelled.
    pub async fn run_ack_listener(&self, cancel: CancellationToken) -> Result<(), CbError> {
        let mut acks = self.queue.acks().await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: "cb.sync.coordinator", "Ack listener received shutdown signal, exiting");
                    return Ok(());
                }
                ack = acks.next() => match ack {
                    Some(ack) => self.complete(ack).await,
                    None => {
                        warn!(target: "cb.sync.coordinator", "Ack stream ended unexpectedly");
                        return Err(CbError::Redis("ack stream closed".to_string()));
                    }
                }
            }
        }
    }

    async fn complete(&self, ack: SyncAck) {
        match self.pending.lock().await.remove(&ack.id) {
            Some(tx) => {
                // The waiter may have timed out concurrently.
                let _ = tx.send(());
            }
            None => {
                // Another replica's request, or a handle already evicted.
                debug!(
                    target: "cb.sync.coordinator",
                    request_id = %ack.id,
                    "Acknowledgment without local pending handle"
                );
            }
        }
    }

    /// Number of pending completion handles. Exposed for tests and gauges.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
