//! Distributed bridge carrying relay events between service instances.

use crate::errors::CbError;
use crate::models::EventMessage;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

const EVENTS_CHANNEL: &str = "cb:relay:events";

/// An event tagged with the instance that first published it, so bridged
/// copies are never delivered back to their origin (no echo loop).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub origin: Uuid,
    pub event: EventMessage,
}

/// Transport between relay instances.
#[async_trait]
pub trait EventBridge: Send + Sync {
    /// Forward a locally published event to every other instance.
    async fn forward(&self, envelope: &EventEnvelope) -> Result<(), CbError>;

    /// Live stream of envelopes published by any instance (including this
    /// one; the relay filters its own origin).
    async fn incoming(&self) -> Result<BoxStream<'static, EventEnvelope>, CbError>;
}

/// Redis pub/sub implementation of the bridge.
#[derive(Clone)]
pub struct RedisEventBridge {
    client: Client,
    connection: MultiplexedConnection,
}

impl RedisEventBridge {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `CbError::Redis` if the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, CbError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url as it may contain credentials
            error!(
                target: "cb.relay.bridge",
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
                    target: "cb.relay.bridge",
                    error = %e,
                    "Failed to connect to Redis"
                );
                CbError::Redis(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self { client, connection })
    }
}

#[async_trait]
impl EventBridge for RedisEventBridge {
    async fn forward(&self, envelope: &EventEnvelope) -> Result<(), CbError> {
        let payload = serde_json::to_string(envelope)
            .map_err(|e| CbError::Serialization(e.to_string()))?;

        let mut conn = self.connection.clone();
        let _: i64 = conn
            .publish(EVENTS_CHANNEL, payload)
            .await
            .map_err(|e| CbError::Redis(format!("Failed to forward event: {e}")))?;
        Ok(())
    }

    async fn incoming(&self) -> Result<BoxStream<'static, EventEnvelope>, CbError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| CbError::Redis(format!("Failed to open pub/sub connection: {e}")))?;
        pubsub
            .subscribe(EVENTS_CHANNEL)
            .await
            .map_err(|e| CbError::Redis(format!("Failed to subscribe to event channel: {e}")))?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                let payload: String = msg.get_payload().ok()?;
                match serde_json::from_str::<EventEnvelope>(&payload) {
                    Ok(envelope) => Some(envelope),
                    Err(e) => {
                        warn!(
                            target: "cb.relay.bridge",
                            error = %e,
                            "Dropping unparseable bridged event"
                        );
                        None
                    }
                }
            })
            .boxed();

        Ok(stream)
    }
}
