//! In-process signaling relay, bridged for cross-instance delivery.
//!
//! Delivery contract:
//!
//! - A published event reaches every local subscriber registered at publish
//!   time whose filter matches, and is forwarded once over the bridge so
//!   subscribers on other instances receive it too.
//! - Events arriving from the bridge are delivered to local subscribers
//!   only, never re-forwarded, and envelopes that originated here are
//!   dropped (no echo loop).
//! - Per-sender ordering is preserved per subscriber; there is no ordering
//!   guarantee across distinct senders.

pub mod bridge;

pub use bridge::{EventBridge, EventEnvelope, RedisEventBridge};

use crate::errors::CbError;
use crate::models::EventMessage;
use crate::observability::metrics;
use common::types::{GameId, UserId};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Subscriber {
    game_id: GameId,
    user_id: UserId,
    tx: mpsc::UnboundedSender<EventMessage>,
}

impl Subscriber {
    /// Subscribers receive events of their game that are addressed to them,
    /// plus broadcasts from everyone but themselves.
    fn matches(&self, event: &EventMessage) -> bool {
        event.game_id() == self.game_id
            && (event.recipient_id() == Some(self.user_id)
                || (event.recipient_id().is_none() && event.sender_id() != self.user_id))
    }
}

/// Publish/subscribe relay for signaling events.
pub struct EventRelay {
    instance_id: Uuid,
    subscribers: Mutex<Vec<Subscriber>>,
    bridge: Arc<dyn EventBridge>,
}

/// A live subscription. Dropping it is the only unsubscribe; the relay
/// prunes closed subscribers on the next publish.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<EventMessage>,
}

impl EventStream {
    /// Next matching event, or `None` once the relay is gone.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        self.rx.recv().await
    }
}

impl EventRelay {
    #[must_use]
    pub fn new(bridge: Arc<dyn EventBridge>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            subscribers: Mutex::new(Vec::new()),
            bridge,
        }
    }

    /// Deliver `event` to matching local subscribers and forward it over
    /// the bridge for subscribers on other instances.
    pub async fn publish(&self, event: EventMessage) -> Result<(), CbError> {
        metrics::record_event_published(event.kind());
        self.deliver_local(&event).await;
        self.bridge
            .forward(&EventEnvelope {
                origin: self.instance_id,
                event,
            })
            .await
    }

    /// Register a subscriber for `game_id` events addressed to `user_id`.
    ///
    /// Side effect: publishes a synthetic `connected` event on the
    /// subscriber's behalf. Clients may never submit one themselves.
    pub async fn subscribe(
        &self,
        game_id: GameId,
        user_id: UserId,
    ) -> Result<EventStream, CbError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(Subscriber {
            game_id,
            user_id,
            tx,
        });

        debug!(
            target: "cb.relay",
            game_id = game_id,
            user_id = user_id,
            "Subscription to game events established"
        );

        self.publish(EventMessage::Connected {
            game_id,
            sender_id: user_id,
            recipient_id: None,
        })
        .await?;

        Ok(EventStream { rx })
    }

    /// Consume the bridge and deliver foreign-origin events locally.
    /// Runs until cancelled.
    pub async fn run_bridge(&self, cancel: CancellationToken) -> Result<(), CbError> {
        let mut incoming = self.bridge.incoming().await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: "cb.relay", "Bridge listener received shutdown signal, exiting");
                    return Ok(());
                }
                envelope = incoming.next() => match envelope {
                    Some(envelope) => {
                        if envelope.origin != self.instance_id {
                            self.deliver_local(&envelope.event).await;
                        }
                    }
                    None => {
                        warn!(target: "cb.relay", "Bridge stream ended unexpectedly");
                        return Err(CbError::Redis("bridge stream closed".to_string()));
                    }
                }
            }
        }
    }

    async fn deliver_local(&self, event: &EventMessage) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|subscriber| {
            if !subscriber.matches(event) {
                return !subscriber.tx.is_closed();
            }
            // A failed send means the receiver was dropped; prune it.
            subscriber.tx.send(event.clone()).is_ok()
        });
    }

    /// Number of live subscribers. Exposed for tests and gauges.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}
