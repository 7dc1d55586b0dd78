//! Observability: metrics definitions and the Prometheus recorder.

pub mod metrics;
