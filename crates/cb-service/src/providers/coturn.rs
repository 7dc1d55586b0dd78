//! Coturn ICE capability provider.
//!
//! Contributes the coturn fleet from the database as STUN/TURN servers and
//! maintains the cloud-firewall allowlist so whitelisted clients can reach
//! them. Credentials are minted per user and session with coturn's
//! REST-auth scheme.

use crate::errors::CbError;
use crate::firewall::AllowlistService;
use crate::models::{ServerListing, SessionServer};
use crate::providers::credentials;
use crate::providers::SessionHandler;
use crate::repositories::CoturnServerStore;
use async_trait::async_trait;
use common::types::UserId;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct CoturnSessionHandler {
    servers: Arc<dyn CoturnServerStore>,
    allowlist: Arc<AllowlistService>,
    token_lifetime: Duration,
}

impl CoturnSessionHandler {
    #[must_use]
    pub fn new(
        servers: Arc<dyn CoturnServerStore>,
        allowlist: Arc<AllowlistService>,
        token_lifetime: Duration,
    ) -> Self {
        Self {
            servers,
            allowlist,
            token_lifetime,
        }
    }

    /// A sync timeout means the whitelist row is durable but the firewall
    /// state is unknown. The session stays usable and the next worker tick
    /// converges the firewall, so the caller sees success.
    fn tolerate_sync_timeout(result: Result<(), CbError>, context: &str) -> Result<(), CbError> {
        match result {
            Err(CbError::SyncTimeout) => {
                warn!(
                    target: "cb.providers.coturn",
                    context = %context,
                    "Firewall sync not confirmed in time, continuing"
                );
                Ok(())
            }
            other => other,
        }
    }
}

#[async_trait]
impl SessionHandler for CoturnSessionHandler {
    fn active(&self) -> bool {
        // Disabled by leaving the coturn_servers table empty, not by config.
        true
    }

    async fn create_session(
        &self,
        session_id: &str,
        user_id: UserId,
        client_ip: &str,
    ) -> Result<(), CbError> {
        Self::tolerate_sync_timeout(
            self.allowlist
                .whitelist_ip(session_id, user_id, client_ip)
                .await,
            "create_session",
        )
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), CbError> {
        Self::tolerate_sync_timeout(
            self.allowlist.remove_session(session_id).await,
            "delete_session",
        )
    }

    async fn delete_peer_session(
        &self,
        session_id: &str,
        user_id: UserId,
    ) -> Result<(), CbError> {
        Self::tolerate_sync_timeout(
            self.allowlist.remove_session_user(session_id, user_id).await,
            "delete_peer_session",
        )
    }

    async fn list_servers(&self) -> Result<Vec<ServerListing>, CbError> {
        let servers = self.servers.find_active().await?;
        Ok(servers
            .into_iter()
            .map(|server| ServerListing {
                id: server.host,
                region: server.region,
            })
            .collect())
    }

    async fn session_servers(
        &self,
        session_id: &str,
        user_id: UserId,
    ) -> Result<Vec<SessionServer>, CbError> {
        let servers = self.servers.find_active().await?;
        Ok(servers
            .into_iter()
            .map(|server| {
                let (username, credential) = credentials::mint_credentials(
                    &server.preshared_key,
                    session_id,
                    user_id,
                    self.token_lifetime,
                );
                let urls = credentials::server_urls(&server);
                SessionServer {
                    id: server.host,
                    username,
                    credential,
                    urls,
                }
            })
            .collect())
    }
}
