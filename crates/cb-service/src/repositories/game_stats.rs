//! Per-game per-user connection statistics.
//!
//! Derived data: upserted when a subscriber attaches, removed per game by
//! the expiry sweep.

use crate::errors::CbError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::{GameId, UserId};
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;

/// Store of per-game per-user statistics.
#[async_trait]
pub trait GameUserStatsStore: Send + Sync {
    /// Record one connection attempt, creating the row on first contact.
    async fn record_connection(&self, game_id: GameId, user_id: UserId) -> Result<(), CbError>;

    /// Remove every stats row of a game. Idempotent.
    async fn delete_for_game(&self, game_id: GameId) -> Result<(), CbError>;
}

/// Postgres-backed stats store.
#[derive(Clone)]
pub struct PgGameUserStatsStore {
    pool: PgPool,
}

impl PgGameUserStatsStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameUserStatsStore for PgGameUserStatsStore {
    #[instrument(skip_all, fields(game_id = game_id, user_id = user_id))]
    async fn record_connection(&self, game_id: GameId, user_id: UserId) -> Result<(), CbError> {
        let start = Instant::now();

        sqlx::query(
            r"
            INSERT INTO game_user_stats (game_id, user_id, connection_attempts)
            VALUES ($1, $2, 1)
            ON CONFLICT (game_id, user_id)
            DO UPDATE SET connection_attempts = game_user_stats.connection_attempts + 1
            ",
        )
        .bind(game_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("stats_record_connection", "error", start.elapsed());
            CbError::Database(e.to_string())
        })?;

        metrics::record_db_query("stats_record_connection", "success", start.elapsed());
        Ok(())
    }

    #[instrument(skip_all, fields(game_id = game_id))]
    async fn delete_for_game(&self, game_id: GameId) -> Result<(), CbError> {
        let start = Instant::now();

        sqlx::query("DELETE FROM game_user_stats WHERE game_id = $1")
            .bind(game_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("stats_delete_for_game", "error", start.elapsed());
                CbError::Database(e.to_string())
            })?;

        metrics::record_db_query("stats_delete_for_game", "success", start.elapsed());
        Ok(())
    }
}
