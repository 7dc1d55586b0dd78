//! Allowlist mutation facade.
//!
//! Every mutation writes the whitelist store, then requests a firewall
//! sync and waits for its bounded completion handle. A returned
//! `CbError::SyncTimeout` means "unknown", not "failed": the whitelist
//! row is durable and the next worker tick converges the firewall.

use crate::errors::CbError;
use crate::repositories::WhitelistStore;
use crate::sync::SyncCoordinator;
use common::types::UserId;
use std::sync::Arc;
use tracing::debug;

/// Mutation facade over the whitelist store and the sync coordinator.
pub struct AllowlistService {
    store: Arc<dyn WhitelistStore>,
    coordinator: Arc<SyncCoordinator>,
}

impl AllowlistService {
    #[must_use]
    pub fn new(store: Arc<dyn WhitelistStore>, coordinator: Arc<SyncCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// Whitelist `ip` for `user_id` in session `session_id`.
    ///
    /// First writer wins per `(session, user)` pair; a repeated call with a
    /// different IP keeps the original entry.
    pub async fn whitelist_ip(
        &self,
        session_id: &str,
        user_id: UserId,
        ip: &str,
    ) -> Result<(), CbError> {
        debug!(
            target: "cb.firewall.allowlist",
            session_id = %session_id,
            user_id = user_id,
            ip = %ip,
            "Whitelisting IP in cloud firewall"
        );
        self.store.insert_or_get(session_id, user_id, ip).await?;
        self.coordinator.request_sync().await
    }

    /// Remove all whitelists of session `session_id`.
    pub async fn remove_session(&self, session_id: &str) -> Result<(), CbError> {
        debug!(
            target: "cb.firewall.allowlist",
            session_id = %session_id,
            "Removing session whitelists"
        );
        self.store.mark_session_deleted(session_id).await?;
        self.coordinator.request_sync().await
    }

    /// Remove only the whitelist of `user_id` in session `session_id`.
    pub async fn remove_session_user(
        &self,
        session_id: &str,
        user_id: UserId,
    ) -> Result<(), CbError> {
        debug!(
            target: "cb.firewall.allowlist",
            session_id = %session_id,
            user_id = user_id,
            "Removing user whitelist"
        );
        self.store
            .mark_session_user_deleted(session_id, user_id)
            .await?;
        self.coordinator.request_sync().await
    }
}
