//! Service configuration, loaded from environment variables.

use common::config::{DatabaseConfig, ObservabilityConfig, RedisConfig};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Connectivity Broker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the liveness/metrics HTTP listener binds to.
    pub bind_address: String,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub observability: ObservabilityConfig,
    pub firewall: FirewallConfig,
    pub session: SessionConfig,
}

/// Firewall sync configuration.
#[derive(Debug, Clone)]
pub struct FirewallConfig {
    /// Id of the cloud firewall protecting the TURN servers. When unset,
    /// the sync worker is inert (dev and test environments).
    pub firewall_id: Option<String>,
    /// Base URL of the firewall upstream API.
    pub api_base_url: String,
    /// Bearer token for the firewall upstream API.
    pub api_token: String,
    /// Maximum number of source CIDRs the upstream accepts per rule.
    pub max_ips_per_rule: usize,
    /// Interval of the sync worker tick.
    pub sync_tick: Duration,
    /// How long a whitelist mutation waits for its sync acknowledgment.
    pub ack_timeout: Duration,
}

/// Session lifecycle configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions older than this are torn down by the expiry sweep.
    pub max_session_lifetime: Duration,
    /// Interval of the expiry sweep task.
    pub expiry_sweep_interval: Duration,
    /// Lifetime of minted TURN credentials.
    pub token_lifetime: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidVar { var: String, message: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let redis_url = vars
            .get("REDIS_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8085".to_string());

        let firewall_id = vars.get("FIREWALL_ID").cloned().filter(|v| !v.is_empty());

        let api_token = vars.get("FIREWALL_API_TOKEN").cloned().unwrap_or_default();
        if firewall_id.is_some() && api_token.is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "FIREWALL_API_TOKEN".to_string(),
            ));
        }

        let firewall = FirewallConfig {
            firewall_id,
            api_base_url: vars
                .get("FIREWALL_API_BASE_URL")
                .cloned()
                .unwrap_or_else(|| "https://api.hetzner.cloud/v1".to_string()),
            api_token,
            max_ips_per_rule: parse_or(vars, "FIREWALL_MAX_IPS_PER_RULE", 100)?,
            sync_tick: Duration::from_secs(parse_or(vars, "FIREWALL_SYNC_TICK_SECONDS", 1)?),
            ack_timeout: Duration::from_secs(parse_or(
                vars,
                "FIREWALL_SYNC_ACK_TIMEOUT_SECONDS",
                10,
            )?),
        };

        let session = SessionConfig {
            max_session_lifetime: Duration::from_secs(
                parse_or(vars, "MAX_SESSION_LIFETIME_HOURS", 24u64)? * 3600,
            ),
            expiry_sweep_interval: Duration::from_secs(parse_or(
                vars,
                "SESSION_EXPIRY_SWEEP_SECONDS",
                600,
            )?),
            token_lifetime: Duration::from_secs(parse_or(
                vars,
                "TURN_TOKEN_LIFETIME_SECONDS",
                86_400,
            )?),
        };

        Ok(Config {
            bind_address,
            database: DatabaseConfig {
                postgres_url: database_url,
                max_connections: parse_or(vars, "DATABASE_MAX_CONNECTIONS", 5)?,
            },
            redis: RedisConfig { url: redis_url },
            observability: ObservabilityConfig {
                log_level: vars
                    .get("LOG_LEVEL")
                    .cloned()
                    .unwrap_or_else(|| "info".to_string()),
                json_logs: parse_or(vars, "JSON_LOGS", false)?,
            },
            firewall,
            session,
        })
    }
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_or<T>(
    vars: &HashMap<String, String>,
    var: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            var: var.to_string(),
            message: e.to_string(),
        }),
    }
}
