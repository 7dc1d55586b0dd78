//! # CB Test Utilities
//!
//! Shared test utilities for the Connectivity Broker (CB) service.
//!
//! This crate provides in-memory doubles for the cb-service seam traits so
//! integration tests run without Postgres, Redis, or the firewall upstream:
//!
//! - In-memory repository stores (`InMemoryWhitelistStore`, ...)
//! - In-memory sync channel (`InMemorySyncQueue`)
//! - Firewall upstream stub recording calls (`StubFirewallApi`)
//! - Loopback event bridge connecting relays in-process (`LoopbackHub`)

pub mod bridge;
pub mod firewall;
pub mod queue;
pub mod stores;

// Re-export commonly used items
pub use bridge::{LoopbackBridge, LoopbackHub};
pub use firewall::StubFirewallApi;
pub use queue::InMemorySyncQueue;
pub use stores::{
    InMemoryCoturnServerStore, InMemoryGameSessionStore, InMemoryGameUserStatsStore,
    InMemoryWhitelistStore,
};
