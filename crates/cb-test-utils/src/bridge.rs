//! Loopback event bridge connecting relays in-process.

use async_trait::async_trait;
use cb_service::errors::CbError;
use cb_service::relay::{EventBridge, EventEnvelope};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Shared hub standing in for the pub/sub channel. Every bridge created
/// from the same hub sees every forwarded envelope, its own included,
/// matching the Redis broadcast semantics.
#[derive(Default, Clone)]
pub struct LoopbackHub {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<EventEnvelope>>>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge attached to this hub.
    pub fn bridge(&self) -> LoopbackBridge {
        LoopbackBridge { hub: self.clone() }
    }
}

/// In-process implementation of the event bridge.
pub struct LoopbackBridge {
    hub: LoopbackHub,
}

#[async_trait]
impl EventBridge for LoopbackBridge {
    async fn forward(&self, envelope: &EventEnvelope) -> Result<(), CbError> {
        self.hub
            .subscribers
            .lock()
            .await
            .retain(|tx| tx.send(envelope.clone()).is_ok());
        Ok(())
    }

    async fn incoming(&self) -> Result<BoxStream<'static, EventEnvelope>, CbError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub.subscribers.lock().await.push(tx);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|envelope| (envelope, rx))
        })
        .boxed();
        Ok(stream)
    }
}
