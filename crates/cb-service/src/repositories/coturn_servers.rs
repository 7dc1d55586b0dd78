//! Coturn server inventory.

use crate::errors::CbError;
use crate::models::CoturnServer;
use crate::observability::metrics;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;

/// Read access to the coturn server inventory.
#[async_trait]
pub trait CoturnServerStore: Send + Sync {
    /// All servers currently marked active.
    async fn find_active(&self) -> Result<Vec<CoturnServer>, CbError>;
}

/// Postgres-backed coturn server store.
#[derive(Clone)]
pub struct PgCoturnServerStore {
    pool: PgPool,
}

impl PgCoturnServerStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CoturnServerStore for PgCoturnServerStore {
    #[instrument(skip_all)]
    async fn find_active(&self) -> Result<Vec<CoturnServer>, CbError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r"
            SELECT id, host, region, preshared_key,
                   stun_port, turn_udp_port, turn_tcp_port, turns_tcp_port, active
            FROM coturn_servers
            WHERE active
            ORDER BY host
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            metrics::record_db_query("coturn_find_active", "error", start.elapsed());
            CbError::Database(e.to_string())
        })?;

        metrics::record_db_query("coturn_find_active", "success", start.elapsed());
        Ok(rows
            .iter()
            .map(|row| CoturnServer {
                id: row.get("id"),
                host: row.get("host"),
                region: row.get("region"),
                preshared_key: row.get("preshared_key"),
                stun_port: row.get("stun_port"),
                turn_udp_port: row.get("turn_udp_port"),
                turn_tcp_port: row.get("turn_tcp_port"),
                turns_tcp_port: row.get("turns_tcp_port"),
                active: row.get("active"),
            })
            .collect())
    }
}
