//! Database access layer.
//!
//! Each repository exposes a seam trait implemented for Postgres here and
//! in-memory in `cb-test-utils`, so the service logic is testable without
//! a live database.

pub mod coturn_servers;
pub mod game_stats;
pub mod sessions;
pub mod whitelist;

pub use coturn_servers::{CoturnServerStore, PgCoturnServerStore};
pub use game_stats::{GameUserStatsStore, PgGameUserStatsStore};
pub use sessions::{GameSessionStore, PgGameSessionStore};
pub use whitelist::{PgWhitelistStore, WhitelistStore};
