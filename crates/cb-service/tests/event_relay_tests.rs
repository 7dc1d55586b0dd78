//! Event relay integration tests.
//!
//! Cover the delivery filter (game match, addressing, broadcast
//! self-exclusion), the synthetic `connected` event, and cross-instance
//! bridging without echo loops.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cb_service::models::EventMessage;
use cb_service::relay::{EventBridge, EventRelay, EventStream};
use cb_test_utils::LoopbackHub;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn relay_on(hub: &LoopbackHub) -> Arc<EventRelay> {
    Arc::new(EventRelay::new(Arc::new(hub.bridge()) as Arc<dyn EventBridge>))
}

fn spawn_bridge(relay: &Arc<EventRelay>, cancel: &CancellationToken) {
    let relay = relay.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = relay.run_bridge(cancel).await;
    });
}

async fn recv_or_timeout(stream: &mut EventStream) -> Option<EventMessage> {
    tokio::time::timeout(Duration::from_secs(1), stream.recv())
        .await
        .ok()
        .flatten()
}

async fn assert_silent(stream: &mut EventStream) {
    let outcome = tokio::time::timeout(Duration::from_millis(100), stream.recv()).await;
    assert!(outcome.is_err(), "expected no further events");
}

fn candidates(game_id: i64, sender: i64, recipient: Option<i64>) -> EventMessage {
    EventMessage::Candidates {
        game_id,
        sender_id: sender,
        recipient_id: recipient,
        session: serde_json::json!({"sdp": "v=0"}),
        candidates: serde_json::json!([]),
    }
}

#[tokio::test]
async fn subscribing_emits_synthetic_connected_to_peers() {
    let hub = LoopbackHub::new();
    let relay = relay_on(&hub);

    let mut first = relay.subscribe(1, 10).await.unwrap();
    // The subscriber never sees its own synthetic broadcast.
    assert_silent(&mut first).await;

    let _second = relay.subscribe(1, 20).await.unwrap();
    let event = recv_or_timeout(&mut first).await.unwrap();
    assert_eq!(
        event,
        EventMessage::Connected {
            game_id: 1,
            sender_id: 20,
            recipient_id: None,
        }
    );
}

#[tokio::test]
async fn addressed_event_reaches_only_its_recipient() {
    let hub = LoopbackHub::new();
    let relay = relay_on(&hub);

    let mut alice = relay.subscribe(1, 10).await.unwrap();
    let mut bob = relay.subscribe(1, 20).await.unwrap();
    let mut carol = relay.subscribe(1, 30).await.unwrap();

    // Drain the synthetic connected events from later subscriptions.
    recv_or_timeout(&mut alice).await.unwrap();
    recv_or_timeout(&mut alice).await.unwrap();
    recv_or_timeout(&mut bob).await.unwrap();

    relay.publish(candidates(1, 10, Some(20))).await.unwrap();

    let event = recv_or_timeout(&mut bob).await.unwrap();
    assert_eq!(event.sender_id(), 10);
    assert_eq!(event.recipient_id(), Some(20));

    assert_silent(&mut alice).await;
    assert_silent(&mut carol).await;
}

#[tokio::test]
async fn broadcast_excludes_the_sender_and_other_games() {
    let hub = LoopbackHub::new();
    let relay = relay_on(&hub);

    let mut sender = relay.subscribe(1, 10).await.unwrap();
    let mut peer = relay.subscribe(1, 20).await.unwrap();
    let mut other_game = relay.subscribe(2, 30).await.unwrap();

    recv_or_timeout(&mut sender).await.unwrap();

    relay
        .publish(EventMessage::PeerClosing {
            game_id: 1,
            sender_id: 10,
            recipient_id: None,
        })
        .await
        .unwrap();

    let event = recv_or_timeout(&mut peer).await.unwrap();
    assert_eq!(event.kind(), "peerClosing");

    assert_silent(&mut sender).await;
    assert_silent(&mut other_game).await;
}

#[tokio::test]
async fn bridged_relays_deliver_across_instances_without_echo() {
    let hub = LoopbackHub::new();
    let relay_a = relay_on(&hub);
    let relay_b = relay_on(&hub);
    let cancel = CancellationToken::new();
    spawn_bridge(&relay_a, &cancel);
    spawn_bridge(&relay_b, &cancel);
    // Let both bridge listeners attach to the hub before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut on_a = relay_a.subscribe(1, 10).await.unwrap();
    let mut on_b = relay_b.subscribe(1, 20).await.unwrap();

    // Subscriber on A sees B's synthetic connected through the bridge.
    let event = recv_or_timeout(&mut on_a).await.unwrap();
    assert_eq!(event.sender_id(), 20);

    relay_a.publish(candidates(1, 10, Some(20))).await.unwrap();

    let event = recv_or_timeout(&mut on_b).await.unwrap();
    assert_eq!(event.sender_id(), 10);
    // Exactly once: the hub echoes the envelope back to A, which must drop
    // its own origin instead of delivering a duplicate.
    assert_silent(&mut on_b).await;
    assert_silent(&mut on_a).await;

    cancel.cancel();
}

#[tokio::test]
async fn dropped_subscribers_are_pruned_on_publish() {
    let hub = LoopbackHub::new();
    let relay = relay_on(&hub);

    let mut keeper = relay.subscribe(1, 10).await.unwrap();
    {
        let _dropped = relay.subscribe(1, 20).await.unwrap();
        recv_or_timeout(&mut keeper).await.unwrap();
    }
    assert_eq!(relay.subscriber_count().await, 2);

    relay.publish(candidates(1, 30, None)).await.unwrap();

    assert_eq!(relay.subscriber_count().await, 1);
    let event = recv_or_timeout(&mut keeper).await.unwrap();
    assert_eq!(event.sender_id(), 30);
}
