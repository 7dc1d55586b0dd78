//! Session orchestration.
//!
//! Joins a user into a game session by fanning out to every active ICE
//! capability provider, relays signaling events between the session's
//! peers, and tears sessions down when they outlive the configured
//! maximum.

use crate::errors::CbError;
use crate::models::{EventMessage, ServerListing, SessionDescriptor};
use crate::observability::metrics;
use crate::providers::SessionHandler;
use crate::relay::{EventRelay, EventStream};
use crate::repositories::{GameSessionStore, GameUserStatsStore};
use chrono::Utc;
use common::types::{GameClaims, GameId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Session id derived from a game id, shared by every provider.
#[must_use]
pub fn session_id_for_game(game_id: GameId) -> String {
    format!("game/{game_id}")
}

/// Orchestrates session lifecycle across providers, relay and bookkeeping.
pub struct SessionService {
    handlers: Vec<Arc<dyn SessionHandler>>,
    relay: Arc<EventRelay>,
    sessions: Arc<dyn GameSessionStore>,
    stats: Arc<dyn GameUserStatsStore>,
    max_session_lifetime: Duration,
}

impl SessionService {
    /// Inactive handlers are filtered out once, at wiring time.
    #[must_use]
    pub fn new(
        handlers: Vec<Arc<dyn SessionHandler>>,
        relay: Arc<EventRelay>,
        sessions: Arc<dyn GameSessionStore>,
        stats: Arc<dyn GameUserStatsStore>,
        max_session_lifetime: Duration,
    ) -> Self {
        Self {
            handlers: handlers
                .into_iter()
                .filter(|handler| handler.active())
                .collect(),
            relay,
            sessions,
            stats,
            max_session_lifetime,
        }
    }

    /// Join `claims.user_id` into the session of `game_id` and return the
    /// descriptor with per-provider ICE servers and credentials.
    ///
    /// Any provider error aborts the whole request; session bookkeeping is
    /// written best-effort in the background.
    #[instrument(skip_all, fields(game_id = game_id, user_id = claims.user_id))]
    pub async fn get_session(
        &self,
        claims: &GameClaims,
        game_id: GameId,
        client_ip: &str,
    ) -> Result<SessionDescriptor, CbError> {
        self.check_scope(claims, game_id)?;

        let session_id = session_id_for_game(game_id);
        let mut servers = Vec::new();

        for handler in &self.handlers {
            handler
                .create_session(&session_id, claims.user_id, client_ip)
                .await?;
            servers.extend(
                handler
                    .session_servers(&session_id, claims.user_id)
                    .await?,
            );
        }

        // The row only feeds the expiry sweep; a failed write must not
        // fail the join.
        let sessions = Arc::clone(&self.sessions);
        let bookkeeping_id = session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = sessions.create_if_absent(game_id, &bookkeeping_id).await {
                warn!(
                    target: "cb.services.session",
                    game_id = game_id,
                    error = %e,
                    "Failed to record session bookkeeping row"
                );
            }
        });

        info!(
            target: "cb.services.session",
            game_id = game_id,
            user_id = claims.user_id,
            server_count = servers.len(),
            "Session joined"
        );

        Ok(SessionDescriptor {
            id: game_id.to_string(),
            servers,
        })
    }

    /// List the configured servers of every active provider, without
    /// credentials. Diagnostic surface, not tied to any session.
    pub async fn list_servers(&self) -> Result<Vec<ServerListing>, CbError> {
        let mut listing = Vec::new();
        for handler in &self.handlers {
            listing.extend(handler.list_servers().await?);
        }
        Ok(listing)
    }

    /// Validate and relay a signaling event submitted by `claims.user_id`.
    ///
    /// On `peerClosing` the sender's per-provider state is torn down before
    /// the event is relayed, so peers learn of the departure after the
    /// firewall cleanup is underway.
    #[instrument(skip_all, fields(game_id = game_id, user_id = claims.user_id))]
    pub async fn handle_peer_event(
        &self,
        claims: &GameClaims,
        game_id: GameId,
        event: EventMessage,
    ) -> Result<(), CbError> {
        self.check_scope(claims, game_id)?;

        if matches!(event, EventMessage::Connected { .. }) {
            return Err(CbError::MalformedEvent(
                "connected events are relay-generated and may not be submitted".to_string(),
            ));
        }
        if event.game_id() != game_id {
            return Err(CbError::MalformedEvent(format!(
                "event addresses game {} but was submitted to game {game_id}",
                event.game_id()
            )));
        }
        if event.sender_id() != claims.user_id {
            return Err(CbError::Forbidden(format!(
                "sender id {} does not match authenticated user {}",
                event.sender_id(),
                claims.user_id
            )));
        }

        if matches!(event, EventMessage::PeerClosing { .. }) {
            let session_id = session_id_for_game(game_id);
            for handler in &self.handlers {
                handler
                    .delete_peer_session(&session_id, claims.user_id)
                    .await?;
            }
            debug!(
                target: "cb.services.session",
                game_id = game_id,
                user_id = claims.user_id,
                "Peer closing, provider state removed"
            );
        }

        self.relay.publish(event).await
    }

    /// Attach `claims.user_id` to the event stream of `game_id`.
    #[instrument(skip_all, fields(game_id = game_id, user_id = claims.user_id))]
    pub async fn subscribe(
        &self,
        claims: &GameClaims,
        game_id: GameId,
    ) -> Result<EventStream, CbError> {
        self.check_scope(claims, game_id)?;

        self.stats.record_connection(game_id, claims.user_id).await?;
        self.relay.subscribe(game_id, claims.user_id).await
    }

    /// Tear down every session older than the maximum lifetime.
    ///
    /// Returns the number of sessions removed. One session's failure does
    /// not abort the sweep of the others.
    #[instrument(skip_all)]
    pub async fn expire_sessions(&self) -> Result<u64, CbError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.max_session_lifetime)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        let expired = self.sessions.find_created_before(cutoff).await?;

        let mut removed = 0u64;
        for session in expired {
            match self.teardown_session(&session.id, session.game_id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(
                        target: "cb.services.session",
                        session_id = %session.id,
                        game_id = session.game_id,
                        error = %e,
                        "Failed to expire session, will retry next sweep"
                    );
                }
            }
        }

        if removed > 0 {
            info!(
                target: "cb.services.session",
                expired_count = removed,
                "Expired stale sessions"
            );
            metrics::record_sessions_expired(removed);
        }
        Ok(removed)
    }

    async fn teardown_session(&self, session_id: &str, game_id: GameId) -> Result<(), CbError> {
        for handler in &self.handlers {
            handler.delete_session(session_id).await?;
        }
        self.stats.delete_for_game(game_id).await?;
        self.sessions.delete(session_id).await
    }

    fn check_scope(&self, claims: &GameClaims, game_id: GameId) -> Result<(), CbError> {
        match claims.game_id {
            Some(scoped) if scoped != game_id => Err(CbError::Forbidden(format!(
                "token is scoped to game {scoped}, not game {game_id}"
            ))),
            // Legacy lobby tokens carry no game scope and may join any game.
            _ => Ok(()),
        }
    }
}
