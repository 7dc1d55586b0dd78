//! Connectivity Broker error types.
//!
//! Internal details are logged server-side; the web layer maps variants to
//! HTTP status codes (`Forbidden` -> 403, `MalformedEvent` -> 400,
//! `SyncTimeout` -> 504, everything else -> 500).

use thiserror::Error;

/// Connectivity Broker error type.
#[derive(Debug, Error)]
pub enum CbError {
    /// Caller's token scope does not permit the requested game.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A signaling event failed protocol validation (cross-game id,
    /// spoofed sender, or a client-submitted `connected` event).
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A firewall sync request was not acknowledged within the deadline.
    ///
    /// This means "unknown", not "failed": the change may still converge
    /// on a later worker tick.
    #[error("Firewall sync was not acknowledged in time")]
    SyncTimeout,

    /// The firewall upstream call failed or reported per-rule errors.
    /// Recovered automatically on the next worker tick.
    #[error("Firewall upstream error: {0}")]
    Upstream(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}
