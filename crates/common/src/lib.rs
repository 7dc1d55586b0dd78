//! Common utilities and types shared across Connectivity Broker components.

#![warn(clippy::pedantic)]

/// Module for common configuration
pub mod config;

/// Module for common data types
pub mod types;
