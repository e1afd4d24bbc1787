//! Lightweight in-process metrics.
//!
//! Operational counters for the bridge itself, rendered in Prometheus text
//! format by the `/metrics` handler alongside the current parameter values.

pub mod metrics;

pub use metrics::BridgeMetrics;
