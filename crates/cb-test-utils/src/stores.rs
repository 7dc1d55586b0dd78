//! In-memory repository doubles.
//!
//! Mirror the semantics of the Postgres stores closely enough for service
//! logic tests: first-writer-wins active pairs, soft deletion, creation
//! order, idempotent removals.

use async_trait::async_trait;
use cb_service::errors::CbError;
use cb_service::models::{CoturnServer, GameSession, GameUserStats, WhitelistEntry};
use cb_service::repositories::{
    CoturnServerStore, GameSessionStore, GameUserStatsStore, WhitelistStore,
};
use chrono::{DateTime, Utc};
use common::types::{GameId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

/// In-memory whitelist store.
#[derive(Default)]
pub struct InMemoryWhitelistStore {
    entries: Mutex<Vec<WhitelistEntry>>,
    next_id: AtomicI64,
}

impl InMemoryWhitelistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row ever written, soft-deleted ones included.
    pub async fn all_entries(&self) -> Vec<WhitelistEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl WhitelistStore for InMemoryWhitelistStore {
    async fn insert_or_get(
        &self,
        session_id: &str,
        user_id: UserId,
        allowed_ip: &str,
    ) -> Result<WhitelistEntry, CbError> {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries
            .iter()
            .find(|e| e.session_id == session_id && e.user_id == user_id && e.is_active())
        {
            return Ok(existing.clone());
        }

        let entry = WhitelistEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            session_id: session_id.to_string(),
            user_id,
            allowed_ip: allowed_ip.to_string(),
            created_at: Utc::now(),
            deleted_at: None,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn get_all_active(&self) -> Result<Vec<WhitelistEntry>, CbError> {
        // Insertion order equals creation order here.
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.is_active())
            .cloned()
            .collect())
    }

    async fn get_for_session(&self, session_id: &str) -> Result<Vec<WhitelistEntry>, CbError> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.session_id == session_id && e.is_active())
            .cloned()
            .collect())
    }

    async fn mark_session_deleted(&self, session_id: &str) -> Result<u64, CbError> {
        let mut entries = self.entries.lock().await;
        let mut affected = 0;
        for entry in entries
            .iter_mut()
            .filter(|e| e.session_id == session_id && e.is_active())
        {
            entry.deleted_at = Some(Utc::now());
            affected += 1;
        }
        Ok(affected)
    }

    async fn mark_session_user_deleted(
        &self,
        session_id: &str,
        user_id: UserId,
    ) -> Result<u64, CbError> {
        let mut entries = self.entries.lock().await;
        let mut affected = 0;
        for entry in entries
            .iter_mut()
            .filter(|e| e.session_id == session_id && e.user_id == user_id && e.is_active())
        {
            entry.deleted_at = Some(Utc::now());
            affected += 1;
        }
        Ok(affected)
    }
}

/// In-memory session bookkeeping store.
#[derive(Default)]
pub struct InMemoryGameSessionStore {
    rows: Mutex<Vec<GameSession>>,
}

impl InMemoryGameSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row with an explicit creation time, for expiry tests.
    pub async fn insert_with_created_at(
        &self,
        game_id: GameId,
        session_id: &str,
        created_at: DateTime<Utc>,
    ) {
        self.rows.lock().await.push(GameSession {
            id: session_id.to_string(),
            game_id,
            created_at,
        });
    }

    pub async fn all_rows(&self) -> Vec<GameSession> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl GameSessionStore for InMemoryGameSessionStore {
    async fn create_if_absent(&self, game_id: GameId, session_id: &str) -> Result<(), CbError> {
        let mut rows = self.rows.lock().await;
        if !rows.iter().any(|row| row.id == session_id) {
            rows.push(GameSession {
                id: session_id.to_string(),
                game_id,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn find_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<GameSession>, CbError> {
        let mut expired: Vec<GameSession> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.created_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|row| row.created_at);
        Ok(expired)
    }

    async fn delete(&self, session_id: &str) -> Result<(), CbError> {
        self.rows.lock().await.retain(|row| row.id != session_id);
        Ok(())
    }
}

/// In-memory per-game per-user statistics store.
#[derive(Default)]
pub struct InMemoryGameUserStatsStore {
    attempts: Mutex<HashMap<(GameId, UserId), i64>>,
}

impl InMemoryGameUserStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attempts(&self, game_id: GameId, user_id: UserId) -> i64 {
        self.attempts
            .lock()
            .await
            .get(&(game_id, user_id))
            .copied()
            .unwrap_or(0)
    }

    pub async fn all_stats(&self) -> Vec<GameUserStats> {
        self.attempts
            .lock()
            .await
            .iter()
            .map(|(&(game_id, user_id), &connection_attempts)| GameUserStats {
                game_id,
                user_id,
                connection_attempts,
            })
            .collect()
    }
}

#[async_trait]
impl GameUserStatsStore for InMemoryGameUserStatsStore {
    async fn record_connection(&self, game_id: GameId, user_id: UserId) -> Result<(), CbError> {
        *self
            .attempts
            .lock()
            .await
            .entry((game_id, user_id))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn delete_for_game(&self, game_id: GameId) -> Result<(), CbError> {
        self.attempts
            .lock()
            .await
            .retain(|&(g, _), _| g != game_id);
        Ok(())
    }
}

/// In-memory coturn fleet store.
#[derive(Default)]
pub struct InMemoryCoturnServerStore {
    servers: Mutex<Vec<CoturnServer>>,
}

impl InMemoryCoturnServerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, server: CoturnServer) {
        self.servers.lock().await.push(server);
    }

    /// A plausible server for tests that only need one.
    pub fn example_server(id: i64, host: &str) -> CoturnServer {
        CoturnServer {
            id,
            host: host.to_string(),
            region: Some("eu".to_string()),
            preshared_key: "test-preshared-key".to_string(),
            stun_port: Some(3478),
            turn_udp_port: Some(3478),
            turn_tcp_port: Some(3478),
            turns_tcp_port: Some(5349),
            active: true,
        }
    }
}

#[async_trait]
impl CoturnServerStore for InMemoryCoturnServerStore {
    async fn find_active(&self) -> Result<Vec<CoturnServer>, CbError> {
        let mut active: Vec<CoturnServer> = self
            .servers
            .lock()
            .await
            .iter()
            .filter(|server| server.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.host.cmp(&b.host));
        Ok(active)
    }
}
