//! In-memory double of the distributed sync channel.

use async_trait::async_trait;
use cb_service::errors::CbError;
use cb_service::sync::{SyncAck, SyncQueue, SyncRequest};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};

/// In-memory sync channel with configurable leadership.
///
/// Requests are drained by whoever calls `drain`; acknowledgments are
/// broadcast to every open `acks` stream, matching the Redis semantics.
pub struct InMemorySyncQueue {
    requests: Mutex<VecDeque<SyncRequest>>,
    ack_subscribers: Mutex<Vec<mpsc::UnboundedSender<SyncAck>>>,
    leader: AtomicBool,
    failing_acks: AtomicUsize,
}

impl Default for InMemorySyncQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySyncQueue {
    /// A queue whose caller holds leadership.
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(VecDeque::new()),
            ack_subscribers: Mutex::new(Vec::new()),
            leader: AtomicBool::new(true),
            failing_acks: AtomicUsize::new(0),
        }
    }

    /// Grant or revoke the leadership lease.
    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }

    /// Number of currently queued requests.
    pub async fn queued_len(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Make the next `n` `publish_ack` calls fail as if Redis were down.
    pub fn fail_next_acks(&self, n: usize) {
        self.failing_acks.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncQueue for InMemorySyncQueue {
    async fn enqueue(&self, request: &SyncRequest) -> Result<(), CbError> {
        self.requests.lock().await.push_back(*request);
        Ok(())
    }

    async fn drain(&self) -> Result<Vec<SyncRequest>, CbError> {
        Ok(self.requests.lock().await.drain(..).collect())
    }

    async fn publish_ack(&self, ack: &SyncAck) -> Result<(), CbError> {
        if self
            .failing_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CbError::Redis("ack channel unavailable".to_string()));
        }
        self.ack_subscribers
            .lock()
            .await
            .retain(|tx| tx.send(*ack).is_ok());
        Ok(())
    }

    async fn acks(&self) -> Result<BoxStream<'static, SyncAck>, CbError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.ack_subscribers.lock().await.push(tx);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|ack| (ack, rx))
        })
        .boxed();
        Ok(stream)
    }

    async fn try_acquire_leadership(&self) -> Result<bool, CbError> {
        Ok(self.leader.load(Ordering::SeqCst))
    }
}
