//! Session orchestration integration tests.
//!
//! Drive the full in-process stack: session service, coturn provider,
//! allowlist facade, sync coordinator and worker, event relay. Postgres,
//! Redis and the firewall upstream are replaced by the in-memory doubles.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cb_service::firewall::AllowlistService;
use cb_service::models::EventMessage;
use cb_service::providers::{CoturnSessionHandler, SessionHandler};
use cb_service::relay::{EventBridge, EventRelay};
use cb_service::repositories::{GameUserStatsStore, WhitelistStore};
use cb_service::services::SessionService;
use cb_service::sync::{SyncCoordinator, SyncWorker};
use cb_service::errors::CbError;
use cb_test_utils::{
    InMemoryCoturnServerStore, InMemoryGameSessionStore, InMemoryGameUserStatsStore,
    InMemorySyncQueue, InMemoryWhitelistStore, LoopbackHub, StubFirewallApi,
};
use chrono::{Duration as ChronoDuration, Utc};
use common::types::GameClaims;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    whitelist: Arc<InMemoryWhitelistStore>,
    sessions: Arc<InMemoryGameSessionStore>,
    stats: Arc<InMemoryGameUserStatsStore>,
    firewall: Arc<StubFirewallApi>,
    relay: Arc<EventRelay>,
    service: SessionService,
    cancel: CancellationToken,
}

impl Harness {
    async fn new() -> Self {
        let queue = Arc::new(InMemorySyncQueue::new());
        let whitelist = Arc::new(InMemoryWhitelistStore::new());
        let sessions = Arc::new(InMemoryGameSessionStore::new());
        let stats = Arc::new(InMemoryGameUserStatsStore::new());
        let coturn_servers = Arc::new(InMemoryCoturnServerStore::new());
        coturn_servers
            .push(InMemoryCoturnServerStore::example_server(
                1,
                "turn.example.com",
            ))
            .await;
        let firewall = Arc::new(StubFirewallApi::new());

        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            Duration::from_secs(5),
        ));
        let allowlist = Arc::new(AllowlistService::new(
            whitelist.clone(),
            coordinator.clone(),
        ));
        let worker = SyncWorker::new(
            queue.clone(),
            whitelist.clone(),
            firewall.clone(),
            Some("fw-1".to_string()),
            100,
            Duration::from_millis(10),
        );

        let cancel = CancellationToken::new();
        let ack_cancel = cancel.clone();
        let ack_coordinator = coordinator.clone();
        tokio::spawn(async move {
            let _ = ack_coordinator.run_ack_listener(ack_cancel).await;
        });
        let worker_cancel = cancel.clone();
        tokio::spawn(async move {
            worker.run(worker_cancel).await;
        });

        let hub = LoopbackHub::new();
        let relay = Arc::new(EventRelay::new(
            Arc::new(hub.bridge()) as Arc<dyn EventBridge>
        ));

        let handlers: Vec<Arc<dyn SessionHandler>> = vec![Arc::new(CoturnSessionHandler::new(
            coturn_servers,
            allowlist,
            Duration::from_secs(3600),
        ))];
        let service = SessionService::new(
            handlers,
            relay.clone(),
            sessions.clone(),
            stats.clone(),
            Duration::from_secs(24 * 3600),
        );

        Self {
            whitelist,
            sessions,
            stats,
            firewall,
            relay,
            service,
            cancel,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn joining_whitelists_the_client_and_mints_credentials() -> anyhow::Result<()> {
    let harness = Harness::new().await;
    let claims = GameClaims::unscoped(5);

    let descriptor = harness.service.get_session(&claims, 42, "1.2.3.4").await?;

    assert_eq!(descriptor.id, "42");
    assert_eq!(descriptor.servers.len(), 1);
    let server = descriptor.servers.first().unwrap();
    assert!(server.username.ends_with(":5-game/42"));
    assert!(!server.credential.is_empty());
    assert!(server
        .urls
        .iter()
        .any(|url| url == "stun://turn.example.com:3478"));

    let active = harness.whitelist.get_all_active().await?;
    assert_eq!(active.len(), 1);
    let entry = active.first().unwrap();
    assert_eq!(entry.session_id, "game/42");
    assert_eq!(entry.allowed_ip, "1.2.3.4");

    // get_session resolved only after the sync worker acknowledged, so the
    // upstream already holds the rule.
    let rules = harness.firewall.last_rules().await.unwrap();
    assert!(rules
        .iter()
        .all(|rule| rule.source_ips == vec!["1.2.3.4/32".to_string()]));
    Ok(())
}

#[tokio::test]
async fn scoped_token_cannot_join_another_game() {
    let harness = Harness::new().await;
    let claims = GameClaims::scoped(5, 7);

    let result = harness.service.get_session(&claims, 42, "1.2.3.4").await;
    assert!(matches!(result, Err(CbError::Forbidden(_))));
    assert!(harness.whitelist.get_all_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn protocol_violations_are_rejected() {
    let harness = Harness::new().await;
    let claims = GameClaims::unscoped(5);

    // Clients may not submit relay-generated connected events.
    let result = harness
        .service
        .handle_peer_event(
            &claims,
            42,
            EventMessage::Connected {
                game_id: 42,
                sender_id: 5,
                recipient_id: None,
            },
        )
        .await;
    assert!(matches!(result, Err(CbError::MalformedEvent(_))));

    // Events must address the game they are submitted to.
    let result = harness
        .service
        .handle_peer_event(
            &claims,
            42,
            EventMessage::PeerClosing {
                game_id: 43,
                sender_id: 5,
                recipient_id: None,
            },
        )
        .await;
    assert!(matches!(result, Err(CbError::MalformedEvent(_))));

    // The sender id must match the authenticated user.
    let result = harness
        .service
        .handle_peer_event(
            &claims,
            42,
            EventMessage::PeerClosing {
                game_id: 42,
                sender_id: 6,
                recipient_id: None,
            },
        )
        .await;
    assert!(matches!(result, Err(CbError::Forbidden(_))));
}

#[tokio::test]
async fn peer_closing_removes_only_the_sender_and_notifies_peers() {
    let harness = Harness::new().await;

    harness
        .service
        .get_session(&GameClaims::unscoped(5), 42, "1.2.3.4")
        .await
        .unwrap();
    harness
        .service
        .get_session(&GameClaims::unscoped(6), 42, "5.6.7.8")
        .await
        .unwrap();

    let mut peer = harness
        .service
        .subscribe(&GameClaims::unscoped(6), 42)
        .await
        .unwrap();

    harness
        .service
        .handle_peer_event(
            &GameClaims::unscoped(5),
            42,
            EventMessage::PeerClosing {
                game_id: 42,
                sender_id: 5,
                recipient_id: None,
            },
        )
        .await
        .unwrap();

    let active = harness.whitelist.get_all_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active.first().unwrap().user_id, 6);

    let event = tokio::time::timeout(Duration::from_secs(1), peer.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind(), "peerClosing");
    assert_eq!(event.sender_id(), 5);
}

#[tokio::test]
async fn subscribing_records_connection_stats() {
    let harness = Harness::new().await;
    let claims = GameClaims::unscoped(5);

    let _first = harness.service.subscribe(&claims, 42).await.unwrap();
    let _second = harness.service.subscribe(&claims, 42).await.unwrap();

    assert_eq!(harness.stats.attempts(42, 5).await, 2);
    assert_eq!(harness.relay.subscriber_count().await, 2);
}

#[tokio::test]
async fn server_listing_merges_providers_and_carries_no_credentials() -> anyhow::Result<()> {
    let harness = Harness::new().await;

    let listing = harness.service.list_servers().await?;
    assert_eq!(listing.len(), 1);
    let server = listing.first().unwrap();
    assert_eq!(server.id, "turn.example.com");
    assert_eq!(server.region.as_deref(), Some("eu"));
    Ok(())
}

#[tokio::test]
async fn expiry_sweep_tears_down_old_sessions() -> anyhow::Result<()> {
    let harness = Harness::new().await;

    // A fresh join and a session well past the 24 h lifetime.
    harness
        .service
        .get_session(&GameClaims::unscoped(5), 42, "1.2.3.4")
        .await?;
    harness
        .sessions
        .insert_with_created_at(7, "game/7", Utc::now() - ChronoDuration::hours(25))
        .await;
    harness.whitelist.insert_or_get("game/7", 9, "9.9.9.9").await?;
    harness.stats.record_connection(7, 9).await?;

    let removed = harness.service.expire_sessions().await?;
    assert_eq!(removed, 1);

    // Only the expired session's state is gone.
    let active = harness.whitelist.get_all_active().await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active.first().unwrap().session_id, "game/42");
    assert_eq!(harness.stats.attempts(7, 9).await, 0);
    assert!(harness
        .sessions
        .all_rows()
        .await
        .iter()
        .all(|row| row.id != "game/7"));
    Ok(())
}
