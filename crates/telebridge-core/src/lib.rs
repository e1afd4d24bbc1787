//! telebridge core: parameter state, validation and sampling.
//!
//! This crate owns the observed state and the rules for changing it. It
//! carries no transport, runtime or metrics-SDK dependencies; the gateway
//! wires it to HTTP and to an OpenTelemetry sink.
//!
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod param;
pub mod sample;
pub mod state;
pub mod update;
pub mod validate;

pub use error::{BridgeError, ClientCode, Result};
pub use param::{Domain, ParamSpec, ParameterSet};
pub use sample::{MetricSample, MetricsBridge};
pub use state::{SharedState, Snapshot};
pub use update::{Slot, UpdateEndpoint, UpdateRequest};
pub use validate::{Accepted, RawValue};
