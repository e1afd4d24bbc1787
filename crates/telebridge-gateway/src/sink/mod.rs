//! Metrics sinks: where samples go once they leave shared state.
//!
//! A sink has two halves. `record*` updates local instruments and must never
//! block or perform I/O, since it runs on request handlers and collector
//! callbacks. `flush` delivers whatever was recorded to the remote collector
//! and may fail with `SinkUnavailable`.

pub mod log;
pub mod otlp;

use async_trait::async_trait;

use telebridge_core::error::{BridgeError, Result};
use telebridge_core::{MetricSample, MetricsBridge};

pub use self::log::LogSink;
pub use self::otlp::OtlpSink;

/// One hit on a per-route greeting endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCall {
    pub route: String,
    pub name: String,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Short identifier for logs.
    fn kind(&self) -> &'static str;

    /// Record parameter gauges and the derived sum.
    fn record(&self, sample: &MetricSample);

    /// Count one route call.
    fn record_call(&self, call: &RouteCall);

    /// Deliver recorded data to the collector.
    async fn flush(&self) -> Result<()>;

    /// Let the collector pull values through `bridge` on its own schedule.
    fn observe(&self, _bridge: MetricsBridge) -> Result<()> {
        Err(BridgeError::InvalidConfig(format!(
            "{} sink does not support callback observation",
            self.kind()
        )))
    }

    /// Final flush and release of exporter resources.
    async fn shutdown(&self) -> Result<()> {
        self.flush().await
    }
}
