//! Firewall synchronization engine.
//!
//! Collapses concurrent whitelist mutations into few, rate-bounded,
//! idempotent upstream calls:
//!
//! - Every replica runs a [`SyncCoordinator`]: it mints a correlation id
//!   per mutation, enqueues a [`SyncRequest`] onto the distributed queue
//!   and hands the caller a bounded-time completion handle.
//! - Exactly one replica's [`SyncWorker`] holds the leadership lease and
//!   drains the queue on a fixed tick, deriving the complete rule set from
//!   the live whitelist and issuing one full-replace upstream call per
//!   non-empty batch. Acknowledgments are broadcast so every replica's
//!   coordinator can complete its pending handles.

pub mod coordinator;
pub mod queue;
pub mod worker;

pub use coordinator::SyncCoordinator;
pub use queue::RedisSyncQueue;
pub use worker::SyncWorker;

use crate::errors::CbError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Requests a sync. Consumed at most once by the worker; several requests
/// may be satisfied by a single upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Correlation id pairing this request with its acknowledgment.
    pub id: Uuid,
}

/// Confirms that the sync requested under the same id has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncAck {
    pub id: Uuid,
}

/// The distributed sync-request channel.
///
/// Request delivery is work-queue shaped (each request is drained by one
/// worker); acknowledgments are broadcast to every replica.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    /// Enqueue a sync request.
    async fn enqueue(&self, request: &SyncRequest) -> Result<(), CbError>;

    /// Non-blockingly take every currently queued request.
    async fn drain(&self) -> Result<Vec<SyncRequest>, CbError>;

    /// Broadcast an acknowledgment to all replicas.
    async fn publish_ack(&self, ack: &SyncAck) -> Result<(), CbError>;

    /// Live stream of broadcast acknowledgments.
    async fn acks(&self) -> Result<BoxStream<'static, SyncAck>, CbError>;

    /// Acquire or renew the single-active-consumer lease.
    ///
    /// Returns `true` iff this instance is the active upstream caller for
    /// the current tick.
    async fn try_acquire_leadership(&self) -> Result<bool, CbError>;
}
