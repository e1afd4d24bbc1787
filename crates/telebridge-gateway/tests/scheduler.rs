#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use telebridge_core::error::{BridgeError, Result};
use telebridge_core::{MetricSample, MetricsBridge, ParamSpec, ParameterSet, SharedState};
use telebridge_gateway::export::{ExportScheduler, Phase, TickOutcome};
use telebridge_gateway::obs::BridgeMetrics;
use telebridge_gateway::sink::{MetricsSink, RouteCall};

/// Sink whose flush results are scripted; defaults to success.
#[derive(Default)]
struct ScriptedSink {
    script: Mutex<VecDeque<Result<()>>>,
    hang: bool,
    recorded: Mutex<Vec<MetricSample>>,
    flushes: AtomicUsize,
}

impl ScriptedSink {
    fn failing_once() -> Self {
        let sink = Self::default();
        sink.script
            .lock()
            .unwrap()
            .push_back(Err(BridgeError::SinkUnavailable("collector down".into())));
        sink
    }

    fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MetricsSink for ScriptedSink {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn record(&self, sample: &MetricSample) {
        self.recorded.lock().unwrap().push(sample.clone());
    }

    fn record_call(&self, _call: &RouteCall) {}

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or(Ok(()))
    }
}

fn bridge() -> MetricsBridge {
    let params = ParameterSet::new(vec![
        ParamSpec::binary("hub_param_a"),
        ParamSpec::binary("hub_param_b"),
        ParamSpec::binary("hub_param_c"),
    ])
    .unwrap();
    MetricsBridge::new(Arc::new(SharedState::new(params)))
}

fn scheduler(
    bridge: MetricsBridge,
    sink: Arc<ScriptedSink>,
    metrics: Arc<BridgeMetrics>,
) -> ExportScheduler {
    ExportScheduler::new(
        bridge,
        sink,
        metrics,
        Duration::from_secs(1),
        Duration::from_millis(200),
    )
}

#[tokio::test]
async fn tick_records_latest_sample() {
    let bridge = bridge();
    let sink = Arc::new(ScriptedSink::default());
    let metrics = Arc::new(BridgeMetrics::default());
    let s = scheduler(bridge.clone(), sink.clone(), metrics.clone());

    bridge.state().set("hub_param_a", 1).unwrap();
    bridge.state().set("hub_param_c", 1).unwrap();

    match s.tick().await {
        TickOutcome::Exported { version } => assert_eq!(version, 2),
        other => panic!("unexpected outcome {other:?}"),
    }
    let recorded = sink.recorded.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].sum(), 2);
    assert_eq!(s.phase(), Phase::Idle);
    assert_eq!(metrics.export_ticks.get(&[("outcome", "ok")]), 1);
}

#[tokio::test]
async fn failed_export_does_not_block_next_tick() {
    let sink = Arc::new(ScriptedSink::failing_once());
    let metrics = Arc::new(BridgeMetrics::default());
    let s = scheduler(bridge(), sink.clone(), metrics.clone());

    match s.tick().await {
        TickOutcome::Failed(e) => assert_eq!(e.client_code().as_str(), "SINK_UNAVAILABLE"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(matches!(s.tick().await, TickOutcome::Exported { .. }));

    assert_eq!(metrics.export_ticks.get(&[("outcome", "failed")]), 1);
    assert_eq!(metrics.export_ticks.get(&[("outcome", "ok")]), 1);
    assert_eq!(metrics.export_failures.get(&[("code", "SINK_UNAVAILABLE")]), 1);
    assert_eq!(s.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn hanging_flush_times_out() {
    let sink = Arc::new(ScriptedSink::hanging());
    let metrics = Arc::new(BridgeMetrics::default());
    let s = scheduler(bridge(), sink, metrics.clone());

    assert!(matches!(s.tick().await, TickOutcome::Failed(BridgeError::SinkUnavailable(_))));
    assert_eq!(s.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn spawned_scheduler_ticks_per_interval_and_stops() {
    let sink = Arc::new(ScriptedSink::default());
    let metrics = Arc::new(BridgeMetrics::default());
    let s = Arc::new(scheduler(bridge(), sink.clone(), metrics));

    let handle = s.spawn();

    // No export at start; first one after one interval.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(sink.flushes.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(2_600)).await;
    assert_eq!(sink.flushes.load(Ordering::SeqCst), 3);

    handle.stop().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sink.flushes.load(Ordering::SeqCst), 3);
}
