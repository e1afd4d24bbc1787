//! telebridge gateway library entry.
//!
//! Wires config, the HTTP update surface, metrics sinks and the export
//! scheduler around the state kept in `telebridge-core`. Consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod api;
pub mod app_state;
pub mod config;
pub mod export;
pub mod obs;
pub mod ops;
pub mod router;
pub mod shutdown;
pub mod sink;
