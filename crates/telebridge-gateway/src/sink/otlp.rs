//! OpenTelemetry sink: OTLP over gRPC to a collector.
//!
//! Instruments:
//! - one i64 gauge per parameter, named after the parameter.
//! - `sum_instrument`: f64 histogram of the derived sum in push/timer mode,
//!   i64 observable gauge in callback mode.
//! - `{route}_api_call`: u64 counter per configured route.
//!
//! Every data point carries `instance_id`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use opentelemetry::metrics::{
    Counter, Gauge, Histogram, Meter, MeterProvider as _, ObservableGauge,
};
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_otlp::{MetricExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};

use telebridge_core::error::{BridgeError, Result};
use telebridge_core::{MetricSample, MetricsBridge};

use super::{MetricsSink, RouteCall};
use crate::config::{BridgeConfig, ExportMode, OtlpSection};

/// Synchronous instruments, absent in callback mode.
struct PushInstruments {
    /// Declaration order, matching `MetricSample::values`.
    params: Vec<Gauge<i64>>,
    sum: Histogram<f64>,
}

pub struct OtlpSink {
    provider: SdkMeterProvider,
    meter: Meter,
    param_names: Vec<String>,
    sum_instrument: String,
    instance: KeyValue,
    push: Option<PushInstruments>,
    calls: HashMap<String, Counter<u64>>,
    observers: Mutex<Vec<ObservableGauge<i64>>>,
    flushing: Arc<AtomicBool>,
}

impl OtlpSink {
    /// Build the exporter, periodic reader and meter provider from config.
    ///
    /// Must run inside a tokio runtime (the gRPC channel is created here).
    pub fn from_config(cfg: &BridgeConfig) -> Result<Self> {
        let exporter = build_exporter(&cfg.export.otlp, cfg)?;
        let reader = PeriodicReader::builder(exporter)
            .with_interval(cfg.export.interval())
            .build();
        let provider = SdkMeterProvider::builder()
            .with_resource(build_resource(cfg))
            .with_reader(reader)
            .build();

        tracing::info!(
            endpoint = %cfg.export.otlp.endpoint,
            interval_ms = cfg.export.interval_ms,
            auth = cfg.export.otlp.username.is_some(),
            "otlp metrics exporter initialized"
        );
        Ok(Self::with_provider(provider, cfg))
    }

    /// Wire instruments onto an existing provider.
    pub fn with_provider(provider: SdkMeterProvider, cfg: &BridgeConfig) -> Self {
        let scope = InstrumentationScope::builder(format!("{}-meter", cfg.service.name))
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = provider.meter_with_scope(scope);
        let export = &cfg.export;

        let push = (export.mode != ExportMode::Callback).then(|| PushInstruments {
            params: cfg
                .parameters
                .iter()
                .map(|p| {
                    meter
                        .i64_gauge(p.name.clone())
                        .with_description(param_description(&p.name, &p.description))
                        .build()
                })
                .collect(),
            sum: meter
                .f64_histogram(export.sum_instrument.clone())
                .with_description("Sum of all tracked parameters")
                .with_boundaries(export.sum_boundaries.clone())
                .build(),
        });

        let calls = cfg
            .routes
            .iter()
            .map(|route| {
                let counter = meter
                    .u64_counter(format!("{route}_api_call"))
                    .with_description(format!("Number of API calls to {}", route.to_uppercase()))
                    .build();
                (route.clone(), counter)
            })
            .collect();

        Self {
            provider,
            meter,
            param_names: cfg.parameters.iter().map(|p| p.name.clone()).collect(),
            sum_instrument: export.sum_instrument.clone(),
            instance: KeyValue::new("instance_id", cfg.instance_id().to_string()),
            push,
            calls,
            observers: Mutex::new(Vec::new()),
            flushing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn provider(&self) -> &SdkMeterProvider {
        &self.provider
    }
}

#[async_trait]
impl MetricsSink for OtlpSink {
    fn kind(&self) -> &'static str {
        "otlp"
    }

    fn record(&self, sample: &MetricSample) {
        let Some(push) = &self.push else {
            return;
        };
        let attrs = std::slice::from_ref(&self.instance);
        for (gauge, value) in push.params.iter().zip(sample.values()) {
            gauge.record(*value, attrs);
        }
        push.sum
            .record(sample.sum() as f64, std::slice::from_ref(&self.instance));
    }

    fn record_call(&self, call: &RouteCall) {
        let Some(counter) = self.calls.get(&call.route) else {
            tracing::warn!(route = %call.route, "no counter registered for route");
            return;
        };
        counter.add(
            1,
            &[
                self.instance.clone(),
                KeyValue::new("route", format!("/{}/:name", call.route)),
                KeyValue::new("name", call.name.clone()),
            ],
        );
    }

    async fn flush(&self) -> Result<()> {
        if self.flushing.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::SinkUnavailable(
                "previous export still in flight".into(),
            ));
        }

        // force_flush blocks until the exporter answers. The flag is cleared
        // by the blocking task, so a flush abandoned on timeout still holds it.
        let provider = self.provider.clone();
        let flushing = Arc::clone(&self.flushing);
        let joined = tokio::task::spawn_blocking(move || {
            let res = provider.force_flush();
            flushing.store(false, Ordering::Release);
            res
        })
        .await;

        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BridgeError::SinkUnavailable(e.to_string())),
            Err(e) => Err(BridgeError::Internal(format!("flush task failed: {e}"))),
        }
    }

    fn observe(&self, bridge: MetricsBridge) -> Result<()> {
        let shared = Arc::new(CollectionSample::new(bridge, self.param_names.len() + 1));
        let mut gauges = Vec::with_capacity(self.param_names.len() + 1);

        for name in &self.param_names {
            let instance = self.instance.clone();
            let shared = Arc::clone(&shared);
            let param = name.clone();
            gauges.push(
                self.meter
                    .i64_observable_gauge(name.clone())
                    .with_description(param_description(name, ""))
                    .with_callback(move |observer| {
                        if let Some(value) = shared.with(|sample| sample.get(&param)) {
                            observer.observe(value, std::slice::from_ref(&instance));
                        }
                    })
                    .build(),
            );
        }

        let instance = self.instance.clone();
        gauges.push(
            self.meter
                .i64_observable_gauge(self.sum_instrument.clone())
                .with_description("Sum of all tracked parameters")
                .with_callback(move |observer| {
                    let sum = shared.with(MetricSample::sum);
                    observer.observe(sum, std::slice::from_ref(&instance));
                })
                .build(),
        );

        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(gauges);
        tracing::info!(
            parameters = self.param_names.len(),
            sum_instrument = %self.sum_instrument,
            "registered observable gauges"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let provider = self.provider.clone();
        match tokio::task::spawn_blocking(move || provider.shutdown()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BridgeError::SinkUnavailable(format!("shutdown: {e}"))),
            Err(e) => Err(BridgeError::Internal(format!("shutdown task failed: {e}"))),
        }
    }
}

/// One sample shared by every observable callback of a collection.
///
/// The first callback to run samples the bridge; the sample is dropped once
/// all `callbacks` have read it, so the next collection samples afresh.
struct CollectionSample {
    bridge: MetricsBridge,
    callbacks: usize,
    pending: Mutex<Pending>,
}

#[derive(Default)]
struct Pending {
    sample: Option<MetricSample>,
    reads: usize,
}

impl CollectionSample {
    fn new(bridge: MetricsBridge, callbacks: usize) -> Self {
        Self {
            bridge,
            callbacks,
            pending: Mutex::new(Pending::default()),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&MetricSample) -> R) -> R {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(pending.sample.get_or_insert_with(|| self.bridge.sample()));
        pending.reads += 1;
        if pending.reads >= self.callbacks {
            *pending = Pending::default();
        }
        out
    }
}

fn param_description(name: &str, description: &str) -> String {
    if description.is_empty() {
        format!("Current value of {name}")
    } else {
        description.to_string()
    }
}

fn build_resource(cfg: &BridgeConfig) -> Resource {
    Resource::builder()
        .with_service_name(cfg.service.name.clone())
        .with_attributes([
            KeyValue::new("service.version", cfg.service.version.clone()),
            KeyValue::new("service.instance.id", cfg.instance_id().to_string()),
        ])
        .build()
}

fn build_exporter(otlp: &OtlpSection, cfg: &BridgeConfig) -> Result<MetricExporter> {
    let mut builder = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(otlp.endpoint.clone())
        .with_timeout(cfg.export.timeout());

    if let Some(header) = basic_auth(otlp) {
        let value: MetadataValue<Ascii> = header.parse().map_err(|_| {
            BridgeError::InvalidConfig("otlp credentials are not valid header text".into())
        })?;
        let mut metadata = MetadataMap::new();
        metadata.insert("authorization", value);
        builder = builder.with_metadata(metadata);
    }

    builder
        .build()
        .map_err(|e| BridgeError::SinkUnavailable(format!("otlp exporter build failed: {e}")))
}

/// `Basic base64(user:pass)` when a username is configured.
pub fn basic_auth(otlp: &OtlpSection) -> Option<String> {
    let user = otlp.username.as_deref()?;
    let pass = otlp.password.as_deref().unwrap_or_default();
    Some(format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use opentelemetry_sdk::metrics::data::{
        Gauge as GaugeData, Histogram as HistogramData, Metric, ResourceMetrics, Sum as SumData,
    };
    use opentelemetry_sdk::metrics::InMemoryMetricExporter;
    use telebridge_core::SharedState;

    use super::*;
    use crate::config;

    const CFG: &str = r#"
version: 1
service:
  instance_id: "hub-test"
export:
  sink: log
  mode: timer
routes: ["pos"]
"#;

    fn sink_with_memory(cfg: &BridgeConfig) -> (OtlpSink, InMemoryMetricExporter) {
        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter.clone()).build())
            .build();
        (OtlpSink::with_provider(provider, cfg), exporter)
    }

    fn bridge(cfg: &BridgeConfig) -> MetricsBridge {
        MetricsBridge::new(Arc::new(SharedState::new(cfg.parameter_set().unwrap())))
    }

    fn latest(exporter: &InMemoryMetricExporter) -> ResourceMetrics {
        exporter
            .get_finished_metrics()
            .unwrap()
            .pop()
            .expect("at least one export")
    }

    fn metric<'a>(rm: &'a ResourceMetrics, name: &str) -> &'a Metric {
        rm.scope_metrics
            .iter()
            .flat_map(|sm| &sm.metrics)
            .find(|m| m.name == name)
            .unwrap_or_else(|| panic!("no metric named {name}"))
    }

    fn attr(attrs: &[KeyValue], key: &str) -> Option<String> {
        attrs
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.as_str().into_owned())
    }

    /// Single data point of an i64 gauge, checked for `instance_id`.
    fn gauge_value(rm: &ResourceMetrics, name: &str) -> i64 {
        let gauge = metric(rm, name)
            .data
            .as_any()
            .downcast_ref::<GaugeData<i64>>()
            .unwrap_or_else(|| panic!("{name} is not an i64 gauge"));
        assert_eq!(gauge.data_points.len(), 1, "{name}");
        let point = &gauge.data_points[0];
        assert_eq!(attr(&point.attributes, "instance_id").as_deref(), Some("hub-test"));
        point.value
    }

    #[test]
    fn basic_auth_header_is_base64_of_user_and_password() {
        let otlp = OtlpSection {
            username: Some("admin".into()),
            password: Some("admin".into()),
            ..OtlpSection::default()
        };
        assert_eq!(basic_auth(&otlp).as_deref(), Some("Basic YWRtaW46YWRtaW4="));
        assert_eq!(basic_auth(&OtlpSection::default()), None);
    }

    #[tokio::test]
    async fn recorded_sample_is_exported_with_values_and_instance() {
        let cfg = config::load_from_str(CFG).unwrap();
        let (sink, exporter) = sink_with_memory(&cfg);

        let bridge = bridge(&cfg);
        bridge.state().set("hub_param_a", 1).unwrap();
        bridge.state().set("hub_param_c", 1).unwrap();
        sink.record(&bridge.sample());
        sink.flush().await.expect("flush");

        let rm = latest(&exporter);
        assert_eq!(gauge_value(&rm, "hub_param_a"), 1);
        assert_eq!(gauge_value(&rm, "hub_param_b"), 0);
        assert_eq!(gauge_value(&rm, "hub_param_c"), 1);

        let hist = metric(&rm, "hub-utilization")
            .data
            .as_any()
            .downcast_ref::<HistogramData<f64>>()
            .expect("sum is an f64 histogram");
        let point = &hist.data_points[0];
        assert_eq!(point.bounds, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(point.count, 1);
        assert_eq!(point.sum, 2.0);
        assert_eq!(attr(&point.attributes, "instance_id").as_deref(), Some("hub-test"));
    }

    #[tokio::test]
    async fn route_calls_carry_route_name_and_instance() {
        let cfg = config::load_from_str(CFG).unwrap();
        let (sink, exporter) = sink_with_memory(&cfg);

        for name in ["alice", "alice", "bob"] {
            sink.record_call(&RouteCall {
                route: "pos".into(),
                name: name.into(),
            });
        }
        sink.flush().await.expect("flush");

        let rm = latest(&exporter);
        let counter = metric(&rm, "pos_api_call")
            .data
            .as_any()
            .downcast_ref::<SumData<u64>>()
            .expect("route calls are a u64 sum");
        assert!(counter.is_monotonic);

        let alice = counter
            .data_points
            .iter()
            .find(|p| attr(&p.attributes, "name").as_deref() == Some("alice"))
            .expect("alice data point");
        assert_eq!(alice.value, 2);
        assert_eq!(attr(&alice.attributes, "route").as_deref(), Some("/pos/:name"));
        assert_eq!(attr(&alice.attributes, "instance_id").as_deref(), Some("hub-test"));
        assert_eq!(counter.data_points.len(), 2);
    }

    #[tokio::test]
    async fn flush_while_another_is_in_flight_is_refused() {
        let cfg = config::load_from_str(CFG).unwrap();
        let (sink, _exporter) = sink_with_memory(&cfg);

        sink.flushing.store(true, Ordering::SeqCst);
        let err = sink.flush().await.expect_err("overlapping flush");
        assert_eq!(err.client_code().as_str(), "SINK_UNAVAILABLE");

        sink.flushing.store(false, Ordering::SeqCst);
        sink.flush().await.expect("flush after the first one finished");
        assert!(!sink.flushing.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn callback_mode_observes_one_consistent_sample() {
        let mut cfg = config::load_from_str(CFG).unwrap();
        cfg.export.mode = ExportMode::Callback;
        let (sink, exporter) = sink_with_memory(&cfg);
        assert!(sink.push.is_none());

        let bridge = bridge(&cfg);
        sink.observe(bridge.clone()).unwrap();
        assert_eq!(sink.observers.lock().unwrap().len(), 4);

        bridge.state().set("hub_param_b", 1).unwrap();
        bridge.state().set("hub_param_c", 1).unwrap();
        sink.flush().await.expect("flush");

        let rm = latest(&exporter);
        let a = gauge_value(&rm, "hub_param_a");
        let b = gauge_value(&rm, "hub_param_b");
        let c = gauge_value(&rm, "hub_param_c");
        assert_eq!((a, b, c), (0, 1, 1));
        assert_eq!(gauge_value(&rm, "hub-utilization"), a + b + c);
    }

    #[test]
    fn collection_sample_is_shared_until_every_callback_read_it() {
        let cfg = config::load_from_str(CFG).unwrap();
        let bridge = bridge(&cfg);
        let shared = CollectionSample::new(bridge.clone(), 3);

        assert_eq!(shared.with(MetricSample::version), 0);
        bridge.state().set("hub_param_a", 1).unwrap();
        assert_eq!(shared.with(MetricSample::version), 0);
        assert_eq!(shared.with(|s| s.get("hub_param_a")), Some(0));

        // Next collection.
        assert_eq!(shared.with(MetricSample::version), 1);
        assert_eq!(shared.with(MetricSample::sum), 1);
    }
}
