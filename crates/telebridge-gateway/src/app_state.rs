//! Shared application state for the telebridge gateway.
//!
//! Owns the parameter state and hands the update path and the metrics bridge
//! their own handles to it. Startup errors are returned, not panicked.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use telebridge_core::error::Result;
use telebridge_core::{
    MetricSample, MetricsBridge, SharedState, Snapshot, UpdateEndpoint, UpdateRequest,
};

use crate::config::{BridgeConfig, ExportMode, SinkKind};
use crate::obs::BridgeMetrics;
use crate::sink::{LogSink, MetricsSink, OtlpSink};

/// Which inbound shape an update arrived in (metrics label).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateForm {
    Json,
    Path,
}

impl UpdateForm {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateForm::Json => "json",
            UpdateForm::Path => "path",
        }
    }
}

/// Serializes push-mode recording so the sink only ever moves forward in
/// version. Updates finish in any order once they leave the state lock.
#[derive(Default)]
pub(crate) struct PushGate {
    last_version: Mutex<u64>,
}

impl PushGate {
    /// Record `sample` unless a newer one was already recorded.
    pub(crate) fn record(&self, sink: &dyn MetricsSink, sample: &MetricSample) -> bool {
        let mut last = self
            .last_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sample.version() <= *last {
            tracing::debug!(
                version = sample.version(),
                recorded = *last,
                "skipping stale push sample"
            );
            return false;
        }
        sink.record(sample);
        *last = sample.version();
        true
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: BridgeConfig,
    endpoint: UpdateEndpoint,
    bridge: MetricsBridge,
    sink: Arc<dyn MetricsSink>,
    push_gate: PushGate,
    metrics: Arc<BridgeMetrics>,
}

impl AppState {
    /// Build state and the configured sink.
    /// The OTLP sink opens its gRPC channel here, so call from a tokio runtime.
    pub fn new(cfg: BridgeConfig) -> Result<Self> {
        let sink: Arc<dyn MetricsSink> = match cfg.export.sink {
            SinkKind::Otlp => Arc::new(OtlpSink::from_config(&cfg)?),
            SinkKind::Log => Arc::new(LogSink::new(cfg.instance_id())),
        };
        Self::with_sink(cfg, sink)
    }

    /// Build state around an explicit sink.
    pub fn with_sink(cfg: BridgeConfig, sink: Arc<dyn MetricsSink>) -> Result<Self> {
        let params = cfg.parameter_set()?;
        let state = Arc::new(SharedState::new(params));

        tracing::info!(
            parameters = ?state.params().names().collect::<Vec<_>>(),
            mode = ?cfg.export.mode,
            sink = sink.kind(),
            instance_id = %cfg.instance_id(),
            "bridge state initialized"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                endpoint: UpdateEndpoint::new(Arc::clone(&state)),
                bridge: MetricsBridge::new(state),
                cfg,
                sink,
                push_gate: PushGate::default(),
                metrics: Arc::new(BridgeMetrics::default()),
            }),
        })
    }

    pub fn cfg(&self) -> &BridgeConfig {
        &self.inner.cfg
    }

    pub fn bridge(&self) -> &MetricsBridge {
        &self.inner.bridge
    }

    pub fn sink(&self) -> Arc<dyn MetricsSink> {
        Arc::clone(&self.inner.sink)
    }

    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Current values without writing.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.endpoint.state().get()
    }

    /// Apply an update, count it, and in push mode record the result.
    pub fn apply(&self, form: UpdateForm, req: &UpdateRequest) -> Result<Snapshot> {
        let started = Instant::now();
        let res = self.inner.endpoint.update(req);
        let metrics = &self.inner.metrics;
        metrics
            .update_duration
            .observe(&[("form", form.as_str())], started.elapsed());

        match &res {
            Ok(snap) => {
                metrics
                    .update_requests
                    .inc(&[("form", form.as_str()), ("code", "OK")]);
                let values = snap
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                tracing::info!(version = snap.version(), %values, "updated parameters");

                if self.inner.cfg.export.mode == ExportMode::Push {
                    let sample = MetricSample::from_snapshot(snap.clone());
                    self.inner.push_gate.record(self.inner.sink.as_ref(), &sample);
                }
            }
            Err(e) => {
                metrics
                    .update_requests
                    .inc(&[("form", form.as_str()), ("code", e.client_code().as_str())]);
                tracing::debug!(form = form.as_str(), error = %e, "update rejected");
            }
        }
        res
    }
}
