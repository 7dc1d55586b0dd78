//! Redis-backed sync-request channel.
//!
//! # Key Patterns
//!
//! - `cb:firewall:sync:requests` - LIST used as the work queue
//! - `cb:firewall:sync:acks` - pub/sub channel broadcasting acknowledgments
//! - `cb:firewall:sync:leader` - leadership lease key
//!
//! # Single active consumer
//!
//! The upstream firewall API must be called by exactly one worker cluster
//! wide. The lease below substitutes a broker's "single active consumer"
//! delivery mode: a short-TTL key holds the owning instance id and is
//! renewed every tick, so a crashed leader is replaced within the TTL.
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe for
//! concurrent use; each operation clones it instead of locking.

use crate::errors::CbError;
use crate::sync::{SyncAck, SyncQueue, SyncRequest};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::num::NonZeroUsize;
use tracing::{error, warn};
use uuid::Uuid;

const SYNC_QUEUE_KEY: &str = "cb:firewall:sync:requests";
const ACK_CHANNEL: &str = "cb:firewall:sync:acks";
const LEADER_KEY: &str = "cb:firewall:sync:leader";

/// Lease TTL. Must comfortably exceed the worker tick so an active leader
/// renews before expiry.
const LEADER_TTL_SECONDS: u64 = 5;

/// Lua script for the leadership lease.
///
/// Arguments:
/// - KEYS[1]: Lease key
/// - ARGV[1]: This instance's id
/// - ARGV[2]: Lease TTL in seconds
///
/// Returns:
/// - 1: This instance holds the lease (acquired or renewed)
/// - 0: Another instance holds the lease
const ACQUIRE_LEADERSHIP: &str = r"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'EX', ARGV[2]) then
    return 1
end
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('EXPIRE', KEYS[1], ARGV[2])
    return 1
end
return 0
";

/// Redis implementation of the distributed sync channel.
#[derive(Clone)]
pub struct RedisSyncQueue {
    client: Client,
    connection: MultiplexedConnection,
    instance_id: String,
    leadership_script: Script,
}

impl RedisSyncQueue {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `CbError::Redis` if the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, CbError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url as it may contain credentials
            error!(
                target: "cb.sync.queue",
                error = %e,
                "Failed to open Redis client"
            );
            CbError::Redis(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(
                    target: "cb.sync.queue",
                    error = %e,
                    "Failed to connect to Redis"
                );
                CbError::Redis(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            client,
            connection,
            instance_id: Uuid::new_v4().to_string(),
            leadership_script: Script::new(ACQUIRE_LEADERSHIP),
        })
    }
}

#[async_trait]
impl SyncQueue for RedisSyncQueue {
    async fn enqueue(&self, request: &SyncRequest) -> Result<(), CbError> {
        let payload = serde_json::to_string(request)
            .map_err(|e| CbError::Serialization(e.to_string()))?;

        let mut conn = self.connection.clone();
        let _: i64 = conn
            .lpush(SYNC_QUEUE_KEY, payload)
            .await
            .map_err(|e| CbError::Redis(format!("Failed to enqueue sync request: {e}")))?;
        Ok(())
    }

    async fn drain(&self) -> Result<Vec<SyncRequest>, CbError> {
        let mut conn = self.connection.clone();
        let mut requests = Vec::new();

        loop {
            let chunk: Vec<String> = conn
                .rpop(SYNC_QUEUE_KEY, NonZeroUsize::new(64))
                .await
                .map_err(|e| CbError::Redis(format!("Failed to drain sync queue: {e}")))?;
            if chunk.is_empty() {
                break;
            }
            for payload in &chunk {
                match serde_json::from_str::<SyncRequest>(payload) {
                    Ok(request) => requests.push(request),
                    Err(e) => {
                        warn!(
                            target: "cb.sync.queue",
                            error = %e,
                            "Dropping unparseable sync request"
                        );
                    }
                }
            }
        }

        Ok(requests)
    }

    async fn publish_ack(&self, ack: &SyncAck) -> Result<(), CbError> {
        let payload =
            serde_json::to_string(ack).map_err(|e| CbError::Serialization(e.to_string()))?;

        let mut conn = self.connection.clone();
        let _: i64 = conn
            .publish(ACK_CHANNEL, payload)
            .await
            .map_err(|e| CbError::Redis(format!("Failed to publish sync ack: {e}")))?;
        Ok(())
    }

    async fn acks(&self) -> Result<BoxStream<'static, SyncAck>, CbError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| CbError::Redis(format!("Failed to open pub/sub connection: {e}")))?;
        pubsub
            .subscribe(ACK_CHANNEL)
            .await
            .map_err(|e| CbError::Redis(format!("Failed to subscribe to ack channel: {e}")))?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                let payload: String = msg.get_payload().ok()?;
                match serde_json::from_str::<SyncAck>(&payload) {
                    Ok(ack) => Some(ack),
                    Err(e) => {
                        warn!(
                            target: "cb.sync.queue",
                            error = %e,
                            "Dropping unparseable sync ack"
                        );
                        None
                    }
                }
            })
            .boxed();

        Ok(stream)
    }

    async fn try_acquire_leadership(&self) -> Result<bool, CbError> {
        let mut conn = self.connection.clone();
        let granted: i32 = self
            .leadership_script
            .key(LEADER_KEY)
            .arg(&self.instance_id)
            .arg(LEADER_TTL_SECONDS)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CbError::Redis(format!("Failed to acquire leadership lease: {e}")))?;
        Ok(granted == 1)
    }
}
