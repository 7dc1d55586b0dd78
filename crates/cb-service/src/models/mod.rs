//! Data models for the Connectivity Broker.

use chrono::{DateTime, Utc};
use common::types::{GameId, UserId};
use serde::{Deserialize, Serialize};

/// One row of the firewall whitelist: a single IP allowed to reach the
/// TURN infrastructure on behalf of one user in one session.
///
/// Rows are soft-deleted only (audit trail); at most one row per
/// `(session_id, user_id)` has `deleted_at = NULL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistEntry {
    pub id: i64,
    pub session_id: String,
    pub user_id: UserId,
    /// IPv4 or IPv6 literal, e.g. "88.217.205.180" or "2001:db8::1".
    pub allowed_ip: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WhitelistEntry {
    /// Whether this entry currently grants access.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Bookkeeping record of an ICE session, created lazily on first access
/// and removed by the periodic expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    /// Derived session id, `"game/<game_id>"`.
    pub id: String,
    pub game_id: GameId,
    pub created_at: DateTime<Utc>,
}

/// Per-game per-user connection statistics, derived data removed together
/// with the owning session by the expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameUserStats {
    pub game_id: GameId,
    pub user_id: UserId,
    pub connection_attempts: i64,
}

/// A coturn server row. Leave the table empty to disable the coturn
/// provider without redeploying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoturnServer {
    pub id: i64,
    pub host: String,
    pub region: Option<String>,
    /// Shared secret for coturn's REST-auth credential scheme.
    pub preshared_key: String,
    pub stun_port: Option<i32>,
    pub turn_udp_port: Option<i32>,
    pub turn_tcp_port: Option<i32>,
    pub turns_tcp_port: Option<i32>,
    pub active: bool,
}

/// A signaling event exchanged between the peers of one game session.
///
/// Transient: relayed, never persisted. `recipient_id = None` means
/// broadcast to every other participant of the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum EventMessage {
    /// A new peer is listening for events. Manufactured by the relay on
    /// subscription; clients must never submit one themselves.
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        game_id: GameId,
        sender_id: UserId,
        recipient_id: Option<UserId>,
    },
    /// Intentional closing of a connected peer.
    #[serde(rename = "peerClosing", rename_all = "camelCase")]
    PeerClosing {
        game_id: GameId,
        sender_id: UserId,
        recipient_id: Option<UserId>,
    },
    /// WebRTC connection details for a peer-to-peer connection. The
    /// `session` and `candidates` payloads are passed through verbatim.
    #[serde(rename = "candidates", rename_all = "camelCase")]
    Candidates {
        game_id: GameId,
        sender_id: UserId,
        recipient_id: Option<UserId>,
        session: serde_json::Value,
        candidates: serde_json::Value,
    },
}

impl EventMessage {
    #[must_use]
    pub fn game_id(&self) -> GameId {
        match self {
            Self::Connected { game_id, .. }
            | Self::PeerClosing { game_id, .. }
            | Self::Candidates { game_id, .. } => *game_id,
        }
    }

    #[must_use]
    pub fn sender_id(&self) -> UserId {
        match self {
            Self::Connected { sender_id, .. }
            | Self::PeerClosing { sender_id, .. }
            | Self::Candidates { sender_id, .. } => *sender_id,
        }
    }

    #[must_use]
    pub fn recipient_id(&self) -> Option<UserId> {
        match self {
            Self::Connected { recipient_id, .. }
            | Self::PeerClosing { recipient_id, .. }
            | Self::Candidates { recipient_id, .. } => *recipient_id,
        }
    }

    /// Short variant name for logs and metrics labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::PeerClosing { .. } => "peerClosing",
            Self::Candidates { .. } => "candidates",
        }
    }
}

/// The session descriptor returned to a joining peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub id: String,
    pub servers: Vec<SessionServer>,
}

/// One ICE server entry of a session descriptor, carrying short-lived
/// credentials minted for the requesting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionServer {
    pub id: String,
    pub username: String,
    pub credential: String,
    pub urls: Vec<String>,
}

/// Global server listing without credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerListing {
    pub id: String,
    pub region: Option<String>,
}
