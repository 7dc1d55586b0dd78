//! HTTP request handlers for the Connectivity Broker.

pub mod health;
pub mod metrics;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
