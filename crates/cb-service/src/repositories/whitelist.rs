//! Firewall whitelist repository.
//!
//! Soft-deleting log of per-session per-user allowed IPs. At most one row
//! per `(session_id, user_id)` is active at a time, enforced by a partial
//! unique index so that the invariant holds across processes.
//!
//! # Security
//!
//! - Same-pair races are resolved by the storage constraint plus a
//!   conflict-triggered re-read, never an application lock
//! - All queries use parameterized statements (SQL injection safe)

use crate::errors::CbError;
use crate::models::WhitelistEntry;
use crate::observability::metrics;
use async_trait::async_trait;
use common::types::UserId;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;

/// Durable store of whitelist entries.
#[async_trait]
pub trait WhitelistStore: Send + Sync {
    /// Insert an active entry for `(session_id, user_id)`, or return the
    /// existing active one. First writer wins for the pair, even when the
    /// IPs differ.
    async fn insert_or_get(
        &self,
        session_id: &str,
        user_id: UserId,
        allowed_ip: &str,
    ) -> Result<WhitelistEntry, CbError>;

    /// All active entries, ordered by creation time (rule determinism).
    async fn get_all_active(&self) -> Result<Vec<WhitelistEntry>, CbError>;

    /// Active entries of one session.
    async fn get_for_session(&self, session_id: &str) -> Result<Vec<WhitelistEntry>, CbError>;

    /// Soft-delete every active entry of a session. Idempotent.
    /// Returns the number of rows affected.
    async fn mark_session_deleted(&self, session_id: &str) -> Result<u64, CbError>;

    /// Soft-delete one user's active entry in a session. Idempotent.
    /// Returns the number of rows affected.
    async fn mark_session_user_deleted(
        &self,
        session_id: &str,
        user_id: UserId,
    ) -> Result<u64, CbError>;
}

/// Postgres-backed whitelist store.
#[derive(Clone)]
pub struct PgWhitelistStore {
    pool: PgPool,
}

impl PgWhitelistStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ENTRY_COLUMNS: &str = "id, session_id, user_id, allowed_ip, created_at, deleted_at";

#[async_trait]
impl WhitelistStore for PgWhitelistStore {
    #[instrument(skip_all, fields(session_id = %session_id, user_id = user_id))]
    async fn insert_or_get(
        &self,
        session_id: &str,
        user_id: UserId,
        allowed_ip: &str,
    ) -> Result<WhitelistEntry, CbError> {
        let start = Instant::now();

        // The insert and the re-read can both lose a race with a concurrent
        // writer or a concurrent soft-delete, so a couple of attempts are
        // needed before giving up.
        for _ in 0..3 {
            let inserted = sqlx::query(&format!(
                r"
                INSERT INTO firewall_whitelist (session_id, user_id, allowed_ip)
                VALUES ($1, $2, $3)
                ON CONFLICT (session_id, user_id) WHERE deleted_at IS NULL DO NOTHING
                RETURNING {ENTRY_COLUMNS}
                "
            ))
            .bind(session_id)
            .bind(user_id)
            .bind(allowed_ip)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("whitelist_insert_or_get", "error", start.elapsed());
                CbError::Database(e.to_string())
            })?;

            if let Some(row) = inserted {
                metrics::record_db_query("whitelist_insert_or_get", "success", start.elapsed());
                return Ok(map_row_to_entry(&row));
            }

            // Conflict: another writer holds the active row. Return it.
            let existing = sqlx::query(&format!(
                r"
                SELECT {ENTRY_COLUMNS}
                FROM firewall_whitelist
                WHERE session_id = $1 AND user_id = $2 AND deleted_at IS NULL
                "
            ))
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                metrics::record_db_query("whitelist_insert_or_get", "error", start.elapsed());
                CbError::Database(e.to_string())
            })?;

            if let Some(row) = existing {
                metrics::record_db_query("whitelist_insert_or_get", "success", start.elapsed());
                return Ok(map_row_to_entry(&row));
            }
        }

        metrics::record_db_query("whitelist_insert_or_get", "error", start.elapsed());
        Err(CbError::Database(format!(
            "could not insert whitelist entry for session {session_id}, user {user_id}"
        )))
    }

    #[instrument(skip_all)]
    async fn get_all_active(&self) -> Result<Vec<WhitelistEntry>, CbError> {
        let start = Instant::now();

        let rows = sqlx::query(&format!(
            r"
            SELECT {ENTRY_COLUMNS}
            FROM firewall_whitelist
            WHERE deleted_at IS NULL
            ORDER BY created_at
            "
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("whitelist_get_all_active", "error", start.elapsed());
            CbError::Database(e.to_string())
        })?;

        metrics::record_db_query("whitelist_get_all_active", "success", start.elapsed());
        Ok(rows.iter().map(map_row_to_entry).collect())
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn get_for_session(&self, session_id: &str) -> Result<Vec<WhitelistEntry>, CbError> {
        let start = Instant::now();

        let rows = sqlx::query(&format!(
            r"
            SELECT {ENTRY_COLUMNS}
            FROM firewall_whitelist
            WHERE session_id = $1 AND deleted_at IS NULL
            ORDER BY created_at
            "
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("whitelist_get_for_session", "error", start.elapsed());
            CbError::Database(e.to_string())
        })?;

        metrics::record_db_query("whitelist_get_for_session", "success", start.elapsed());
        Ok(rows.iter().map(map_row_to_entry).collect())
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn mark_session_deleted(&self, session_id: &str) -> Result<u64, CbError> {
        let start = Instant::now();

        let result = sqlx::query(
            r"
            UPDATE firewall_whitelist
            SET deleted_at = NOW()
            WHERE session_id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("whitelist_mark_session_deleted", "error", start.elapsed());
            CbError::Database(e.to_string())
        })?;

        metrics::record_db_query("whitelist_mark_session_deleted", "success", start.elapsed());
        Ok(result.rows_affected())
    }

    #[instrument(skip_all, fields(session_id = %session_id, user_id = user_id))]
    async fn mark_session_user_deleted(
        &self,
        session_id: &str,
        user_id: UserId,
    ) -> Result<u64, CbError> {
        let start = Instant::now();

        let result = sqlx::query(
            r"
            UPDATE firewall_whitelist
            SET deleted_at = NOW()
            WHERE session_id = $1 AND user_id = $2 AND deleted_at IS NULL
            ",
        )
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query(
                "whitelist_mark_session_user_deleted",
                "error",
                start.elapsed(),
            );
            CbError::Database(e.to_string())
        })?;

        metrics::record_db_query(
            "whitelist_mark_session_user_deleted",
            "success",
            start.elapsed(),
        );
        Ok(result.rows_affected())
    }
}

/// Map a database row to a `WhitelistEntry`.
fn map_row_to_entry(row: &sqlx::postgres::PgRow) -> WhitelistEntry {
    WhitelistEntry {
        id: row.get("id"),
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        allowed_ip: row.get("allowed_ip"),
        created_at: row.get("created_at"),
        deleted_at: row.get("deleted_at"),
    }
}
