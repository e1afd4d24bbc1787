use async_trait::async_trait;

use telebridge_core::error::Result;
use telebridge_core::MetricSample;

use super::{MetricsSink, RouteCall};

/// Sink that only emits structured log lines. Useful without a collector.
#[derive(Debug, Clone)]
pub struct LogSink {
    instance_id: String,
}

impl LogSink {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
        }
    }
}

#[async_trait]
impl MetricsSink for LogSink {
    fn kind(&self) -> &'static str {
        "log"
    }

    fn record(&self, sample: &MetricSample) {
        let values = sample
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        tracing::info!(
            instance_id = %self.instance_id,
            version = sample.version(),
            sum = sample.sum(),
            %values,
            "recording sample"
        );
    }

    fn record_call(&self, call: &RouteCall) {
        tracing::info!(
            instance_id = %self.instance_id,
            route = %call.route,
            name = %call.name,
            "recording route call"
        );
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
