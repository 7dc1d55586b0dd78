//! Firewall upstream API types and client.
//!
//! The upstream exposes a single full-replace "set rules" operation with
//! idempotent semantics: the request carries the complete desired rule set,
//! never a delta.

pub mod allowlist;
pub mod client;
pub mod rules;

pub use allowlist::AllowlistService;
pub use client::HttpFirewallClient;

use crate::errors::CbError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Traffic direction of a firewall rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// Transport protocol of a firewall rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// One firewall rule of the full-replace request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub direction: Direction,
    pub protocol: Protocol,
    /// Source addresses in CIDR notation.
    pub source_ips: Vec<String>,
}

/// Body of the "set rules" call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRulesRequest {
    pub rules: Vec<FirewallRule>,
}

/// Error reported for a single rule action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleError {
    pub code: String,
    pub message: String,
}

/// Outcome of a single rule action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(default)]
    pub error: Option<RuleError>,
}

/// Response of the "set rules" call.
///
/// An empty action list is a success: the upstream already matched the
/// desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRulesResponse {
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

impl SetRulesResponse {
    /// Overall success iff every per-rule outcome is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.actions.iter().all(|action| action.error.is_none())
    }
}

/// The firewall upstream API.
///
/// Must only ever be called by the elected sync worker: the upstream is
/// not idempotent under racing writers.
#[async_trait]
pub trait FirewallApi: Send + Sync {
    /// Replace the complete rule set of the given firewall.
    async fn set_rules(
        &self,
        firewall_id: &str,
        rules: &[FirewallRule],
    ) -> Result<SetRulesResponse, CbError>;
}
