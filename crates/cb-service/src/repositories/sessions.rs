//! ICE session bookkeeping repository.
//!
//! Session rows exist only so the expiry sweep knows which sessions to
//! tear down. They are written best-effort on join and hard-deleted by
//! the sweep.

use crate::errors::CbError;
use crate::models::GameSession;
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::GameId;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;

/// Store of session bookkeeping rows.
#[async_trait]
pub trait GameSessionStore: Send + Sync {
    /// Record a session if no row for the game exists yet.
    async fn create_if_absent(&self, game_id: GameId, session_id: &str) -> Result<(), CbError>;

    /// Sessions created before `cutoff`, oldest first.
    async fn find_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<GameSession>, CbError>;

    /// Remove a session row. Idempotent.
    async fn delete(&self, session_id: &str) -> Result<(), CbError>;
}

/// Postgres-backed session store.
#[derive(Clone)]
pub struct PgGameSessionStore {
    pool: PgPool,
}

impl PgGameSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameSessionStore for PgGameSessionStore {
    #[instrument(skip_all, fields(game_id = game_id))]
    async fn create_if_absent(&self, game_id: GameId, session_id: &str) -> Result<(), CbError> {
        let start = Instant::now();

        sqlx::query(
            r"
            INSERT INTO ice_sessions (id, game_id)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(session_id)
        .bind(game_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("session_create_if_absent", "error", start.elapsed());
            CbError::Database(e.to_string())
        })?;

        metrics::record_db_query("session_create_if_absent", "success", start.elapsed());
        Ok(())
    }

    #[instrument(skip_all)]
    async fn find_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<GameSession>, CbError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r"
            SELECT id, game_id, created_at
            FROM ice_sessions
            WHERE created_at < $1
            ORDER BY created_at
            ",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("session_find_created_before", "error", start.elapsed());
            CbError::Database(e.to_string())
        })?;

        metrics::record_db_query("session_find_created_before", "success", start.elapsed());
        Ok(rows
            .iter()
            .map(|row| GameSession {
                id: row.get("id"),
                game_id: row.get("game_id"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn delete(&self, session_id: &str) -> Result<(), CbError> {
        let start = Instant::now();

        sqlx::query("DELETE FROM ice_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("session_delete", "error", start.elapsed());
                CbError::Database(e.to_string())
            })?;

        metrics::record_db_query("session_delete", "success", start.elapsed());
        Ok(())
    }
}
