//! Timer-driven export loop.
//!
//! Each tick walks Idle -> Sampling -> Exporting -> Idle. A failed or timed
//! out export is logged and counted; the next tick runs regardless. `tick`
//! is public so tests can drive one cycle without a timer.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use telebridge_core::error::BridgeError;
use telebridge_core::MetricsBridge;

use crate::obs::BridgeMetrics;
use crate::sink::MetricsSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Exporting,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Phase::Sampling,
            2 => Phase::Exporting,
            _ => Phase::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Exported { version: u64 },
    Failed(BridgeError),
}

pub struct ExportScheduler {
    bridge: MetricsBridge,
    sink: Arc<dyn MetricsSink>,
    metrics: Arc<BridgeMetrics>,
    interval: Duration,
    timeout: Duration,
    phase: AtomicU8,
}

impl ExportScheduler {
    pub fn new(
        bridge: MetricsBridge,
        sink: Arc<dyn MetricsSink>,
        metrics: Arc<BridgeMetrics>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            bridge,
            sink,
            metrics,
            interval,
            timeout,
            phase: AtomicU8::new(Phase::Idle as u8),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn enter(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Run one sample + export cycle.
    pub async fn tick(&self) -> TickOutcome {
        self.enter(Phase::Sampling);
        let sample = self.bridge.sample();

        self.enter(Phase::Exporting);
        self.sink.record(&sample);
        let res = match tokio::time::timeout(self.timeout, self.sink.flush()).await {
            Ok(res) => res,
            Err(_) => Err(BridgeError::SinkUnavailable(format!(
                "export timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };
        self.enter(Phase::Idle);

        match res {
            Ok(()) => {
                self.metrics.export_ticks.inc(&[("outcome", "ok")]);
                tracing::debug!(
                    sink = self.sink.kind(),
                    version = sample.version(),
                    sum = sample.sum(),
                    "interval exported"
                );
                TickOutcome::Exported {
                    version: sample.version(),
                }
            }
            Err(e) => {
                self.metrics.export_ticks.inc(&[("outcome", "failed")]);
                self.metrics
                    .export_failures
                    .inc(&[("code", e.client_code().as_str())]);
                tracing::warn!(sink = self.sink.kind(), error = %e, "export failed");
                TickOutcome::Failed(e)
            }
        }
    }

    /// Start ticking every `interval`; the first export happens one interval
    /// after start.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            tracing::info!(
                interval_ms = self.interval.as_millis() as u64,
                sink = self.sink.kind(),
                "export scheduler started"
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("export scheduler stopped");
        });
        SchedulerHandle {
            stop: stop_tx,
            task,
        }
    }
}

/// Running scheduler; `stop` waits for an in-progress tick to finish.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "export scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
