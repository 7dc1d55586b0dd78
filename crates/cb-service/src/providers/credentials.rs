//! Coturn REST-auth credential minting.
//!
//! coturn's `use-auth-secret` mode expects a username of the form
//! `<expiry-unix-ts>:<label>` and an HMAC-SHA1 of that username under the
//! server's preshared key as the password. SHA1 is what coturn supports,
//! hence the legacy-use ring constant.

use crate::models::CoturnServer;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use common::types::UserId;
use ring::hmac;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Mint a `(username, credential)` pair valid for `token_lifetime`.
#[must_use]
pub fn mint_credentials(
    preshared_key: &str,
    session_id: &str,
    user_id: UserId,
    token_lifetime: Duration,
) -> (String, String) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let expires_at = now + token_lifetime.as_secs();
    let username = format!("{expires_at}:{user_id}-{session_id}");

    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, preshared_key.as_bytes());
    let tag = hmac::sign(&key, username.as_bytes());
    let credential = STANDARD.encode(tag.as_ref());

    (username, credential)
}

/// URL list of one coturn server, covering whichever ports are configured.
#[must_use]
pub fn server_urls(server: &CoturnServer) -> Vec<String> {
    let mut urls = Vec::new();

    if let Some(port) = server.stun_port {
        urls.push(format!("stun://{}:{}", server.host, port));
    }
    if let Some(port) = server.turn_udp_port {
        urls.push(format!("turn://{}:{}?transport=udp", server.host, port));
    }
    if let Some(port) = server.turn_tcp_port {
        urls.push(format!("turn://{}:{}?transport=tcp", server.host, port));
    }
    if let Some(port) = server.turns_tcp_port {
        urls.push(format!("turns://{}:{}?transport=tcp", server.host, port));
    }

    urls
}
