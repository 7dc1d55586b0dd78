//! ICE capability providers.
//!
//! Each provider establishes per-user state for a session and mints the
//! ICE server credentials it contributes. The orchestrator calls every
//! active provider and merges the server lists. Third-party vendor
//! providers plug in behind the same trait.

pub mod coturn;
pub mod credentials;

pub use coturn::CoturnSessionHandler;

use crate::errors::CbError;
use crate::models::{ServerListing, SessionServer};
use async_trait::async_trait;
use common::types::UserId;

/// One ICE capability provider.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Whether this provider participates in session handling.
    fn active(&self) -> bool;

    /// Establish per-user state for a session.
    ///
    /// `client_ip` is an IP literal, e.g. "88.217.205.180" or
    /// "2001:a61:9c01:11ab:c91e:c468:b262:3442".
    async fn create_session(
        &self,
        session_id: &str,
        user_id: UserId,
        client_ip: &str,
    ) -> Result<(), CbError>;

    /// Tear down an entire session.
    async fn delete_session(&self, session_id: &str) -> Result<(), CbError>;

    /// Tear down a single user's state within a session.
    async fn delete_peer_session(&self, session_id: &str, user_id: UserId)
        -> Result<(), CbError>;

    /// Global server listing without credentials.
    async fn list_servers(&self) -> Result<Vec<ServerListing>, CbError>;

    /// Servers with credentials minted for `user_id` in `session_id`.
    async fn session_servers(
        &self,
        session_id: &str,
        user_id: UserId,
    ) -> Result<Vec<SessionServer>, CbError>;
}
