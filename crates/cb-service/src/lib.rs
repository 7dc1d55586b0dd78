//! Connectivity Broker (CB) Service Library
//!
//! Brokers WebRTC ICE/TURN connectivity credentials for peer-to-peer game
//! sessions and keeps a cloud firewall in sync so that only currently-active
//! peers may reach the relay infrastructure.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `errors` - Error types
//! - `firewall` - Firewall upstream client and allowlist mutation facade
//! - `models` - Data models
//! - `providers` - ICE capability providers (session handlers)
//! - `relay` - In-process signaling relay with a distributed bridge
//! - `repositories` - Database access layer
//! - `services` - Business logic layer
//! - `sync` - Firewall sync coordinator and worker
//! - `tasks` - Periodic background tasks

pub mod config;
pub mod errors;
pub mod firewall;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod providers;
pub mod relay;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod sync;
pub mod tasks;
