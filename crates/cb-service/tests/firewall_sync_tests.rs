//! Firewall sync integration tests.
//!
//! Exercise the coordinator, the worker and the allowlist facade against
//! the in-memory sync channel and the firewall stub:
//! - Batching: many mutations within one tick collapse to one upstream call
//! - Full-replace: rules are derived from the live store, never the batch
//! - All-or-nothing acknowledgment and timeout behavior
//! - Inert worker without a configured firewall or the leadership lease

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cb_service::errors::CbError;
use cb_service::firewall::AllowlistService;
use cb_service::repositories::WhitelistStore;
use cb_service::sync::{SyncCoordinator, SyncQueue, SyncRequest, SyncWorker};
use cb_test_utils::{InMemorySyncQueue, InMemoryWhitelistStore, StubFirewallApi};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Harness {
    queue: Arc<InMemorySyncQueue>,
    store: Arc<InMemoryWhitelistStore>,
    firewall: Arc<StubFirewallApi>,
    coordinator: Arc<SyncCoordinator>,
    allowlist: Arc<AllowlistService>,
    worker: SyncWorker,
    cancel: CancellationToken,
}

impl Harness {
    fn new(firewall_id: Option<&str>, ack_timeout: Duration) -> Self {
        let queue = Arc::new(InMemorySyncQueue::new());
        let store = Arc::new(InMemoryWhitelistStore::new());
        let firewall = Arc::new(StubFirewallApi::new());
        let coordinator = Arc::new(SyncCoordinator::new(queue.clone(), ack_timeout));
        let allowlist = Arc::new(AllowlistService::new(store.clone(), coordinator.clone()));
        let worker = SyncWorker::new(
            queue.clone(),
            store.clone(),
            firewall.clone(),
            firewall_id.map(str::to_string),
            100,
            Duration::from_millis(10),
        );
        Self {
            queue,
            store,
            firewall,
            coordinator,
            allowlist,
            worker,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the ack listener so `request_sync` handles can complete.
    fn spawn_ack_listener(&self) {
        let coordinator = self.coordinator.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let _ = coordinator.run_ack_listener(cancel).await;
        });
    }

    /// Block until at least `n` requests are queued.
    async fn wait_for_queued(&self, n: usize) {
        while self.queue.queued_len().await < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn removing_a_session_is_idempotent_and_empties_it() {
    let harness = Harness::new(Some("fw-1"), Duration::from_secs(5));
    harness.spawn_ack_listener();

    for user_id in [1, 2] {
        let allowlist = harness.allowlist.clone();
        let mutation = tokio::spawn(async move {
            allowlist
                .whitelist_ip("game/1", user_id, &format!("10.0.0.{user_id}"))
                .await
        });
        harness.wait_for_queued(1).await;
        harness.worker.run_once().await.unwrap();
        mutation.await.unwrap().unwrap();
    }

    assert_eq!(
        harness.store.mark_session_deleted("game/1").await.unwrap(),
        2
    );
    assert!(harness
        .store
        .get_for_session("game/1")
        .await
        .unwrap()
        .is_empty());

    // Repeating the removal touches nothing.
    assert_eq!(
        harness.store.mark_session_deleted("game/1").await.unwrap(),
        0
    );
}

#[tokio::test]
async fn burst_of_mutations_collapses_to_one_upstream_call() {
    let harness = Harness::new(Some("fw-1"), Duration::from_secs(5));
    harness.spawn_ack_listener();

    let mut waiters = Vec::new();
    for user_id in 1..=5 {
        let allowlist = harness.allowlist.clone();
        waiters.push(tokio::spawn(async move {
            allowlist
                .whitelist_ip("game/1", user_id, &format!("10.0.0.{user_id}"))
                .await
        }));
    }

    harness.wait_for_queued(5).await;
    let acked = harness.worker.run_once().await.unwrap();
    assert_eq!(acked, 5);
    assert_eq!(harness.firewall.call_count().await, 1);

    for waiter in waiters {
        waiter.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn rules_are_derived_from_live_store_state() {
    let harness = Harness::new(Some("fw-1"), Duration::from_secs(5));
    harness.spawn_ack_listener();

    let allowlist = harness.allowlist.clone();
    let mutation = tokio::spawn(async move {
        allowlist.whitelist_ip("game/7", 42, "88.217.205.180").await
    });

    harness.wait_for_queued(1).await;
    harness.worker.run_once().await.unwrap();
    mutation.await.unwrap().unwrap();

    let rules = harness.firewall.last_rules().await.unwrap();
    // One TCP and one UDP inbound rule carrying the /32.
    assert_eq!(rules.len(), 2);
    for rule in &rules {
        assert_eq!(rule.source_ips, vec!["88.217.205.180/32".to_string()]);
    }

    // A removal enqueued after the first ack produces a second call whose
    // rule set no longer carries the IP.
    let allowlist = harness.allowlist.clone();
    let removal = tokio::spawn(async move { allowlist.remove_session("game/7").await });
    harness.wait_for_queued(1).await;
    harness.worker.run_once().await.unwrap();
    removal.await.unwrap().unwrap();

    assert_eq!(harness.firewall.call_count().await, 2);
    let rules = harness.firewall.last_rules().await.unwrap();
    assert!(rules.is_empty());
}

#[tokio::test]
async fn empty_batch_makes_no_upstream_call() {
    let harness = Harness::new(Some("fw-1"), Duration::from_secs(5));

    // Active entries exist but nothing requested a sync.
    harness
        .store
        .insert_or_get("game/1", 1, "10.0.0.1")
        .await
        .unwrap();

    let acked = harness.worker.run_once().await.unwrap();
    assert_eq!(acked, 0);
    assert_eq!(harness.firewall.call_count().await, 0);
}

#[tokio::test]
async fn worker_is_inert_without_firewall_id() {
    let harness = Harness::new(None, Duration::from_millis(100));

    let result = harness.allowlist.whitelist_ip("game/1", 1, "10.0.0.1").await;
    // No worker acknowledges, so the caller times out; the entry is durable.
    assert!(matches!(result, Err(CbError::SyncTimeout)));

    let acked = harness.worker.run_once().await.unwrap();
    assert_eq!(acked, 0);
    assert_eq!(harness.firewall.call_count().await, 0);
    assert_eq!(harness.store.get_all_active().await.unwrap().len(), 1);
}

#[tokio::test]
async fn non_leader_does_not_call_upstream() {
    let harness = Harness::new(Some("fw-1"), Duration::from_secs(5));
    harness.queue.set_leader(false);

    harness
        .queue
        .enqueue(&SyncRequest { id: Uuid::new_v4() })
        .await
        .unwrap();

    let acked = harness.worker.run_once().await.unwrap();
    assert_eq!(acked, 0);
    assert_eq!(harness.firewall.call_count().await, 0);
    // The request stays queued for the actual leader.
    assert_eq!(harness.queue.queued_len().await, 1);
}

#[tokio::test]
async fn failed_upstream_call_acknowledges_nothing() {
    let harness = Harness::new(Some("fw-1"), Duration::from_millis(200));
    harness.spawn_ack_listener();
    harness
        .firewall
        .push_rule_error("rate_limit", "slow down")
        .await;

    let allowlist = harness.allowlist.clone();
    let mutation =
        tokio::spawn(async move { allowlist.whitelist_ip("game/1", 1, "10.0.0.1").await });

    harness.wait_for_queued(1).await;
    let result = harness.worker.run_once().await;
    assert!(matches!(result, Err(CbError::Upstream(_))));

    // The waiter times out instead of seeing a partial acknowledgment.
    let waited = mutation.await.unwrap();
    assert!(matches!(waited, Err(CbError::SyncTimeout)));

    // Pending map was evicted on timeout.
    assert_eq!(harness.coordinator.pending_count().await, 0);
}

#[tokio::test]
async fn lost_acknowledgment_does_not_abort_the_rest_of_the_batch() {
    let harness = Harness::new(Some("fw-1"), Duration::from_millis(200));
    harness.spawn_ack_listener();

    let mut waiters = Vec::new();
    for user_id in [1, 2] {
        let allowlist = harness.allowlist.clone();
        waiters.push(tokio::spawn(async move {
            allowlist
                .whitelist_ip("game/1", user_id, &format!("10.0.0.{user_id}"))
                .await
        }));
    }
    harness.wait_for_queued(2).await;

    // One ack publication fails; the upstream call itself succeeded, so the
    // run reports the acks it managed to deliver instead of erroring out.
    harness.queue.fail_next_acks(1);
    let acked = harness.worker.run_once().await.unwrap();
    assert_eq!(acked, 1);
    assert_eq!(harness.firewall.call_count().await, 1);

    // Exactly one waiter resolves; the one whose ack was lost times out.
    let mut resolved = 0;
    let mut timed_out = 0;
    for waiter in waiters {
        match waiter.await.unwrap() {
            Ok(()) => resolved += 1,
            Err(e) => {
                assert!(matches!(e, CbError::SyncTimeout));
                timed_out += 1;
            }
        }
    }
    assert_eq!((resolved, timed_out), (1, 1));

    // Both entries are durable regardless of the lost ack.
    assert_eq!(harness.store.get_all_active().await.unwrap().len(), 2);
}

#[tokio::test]
async fn first_writer_wins_for_repeated_whitelisting() {
    let harness = Harness::new(Some("fw-1"), Duration::from_secs(5));
    harness.spawn_ack_listener();

    for ip in ["10.0.0.1", "10.9.9.9"] {
        let allowlist = harness.allowlist.clone();
        let mutation =
            tokio::spawn(async move { allowlist.whitelist_ip("game/1", 1, ip).await });
        harness.wait_for_queued(1).await;
        harness.worker.run_once().await.unwrap();
        mutation.await.unwrap().unwrap();
    }

    let active = harness.store.get_all_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active.first().unwrap().allowed_ip, "10.0.0.1");
}
