//! Metric samples: what a sink receives on every observation.

use std::sync::Arc;
use std::time::SystemTime;

use crate::state::{SharedState, Snapshot};

/// Immutable reading of every parameter plus derived aggregates.
///
/// Derived values are computed from the snapshot at construction time and are
/// never stored back into shared state.
#[derive(Debug, Clone)]
pub struct MetricSample {
    snapshot: Snapshot,
    sum: i64,
    taken_at: SystemTime,
}

impl MetricSample {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let sum = snapshot.sum();
        Self {
            snapshot,
            sum,
            taken_at: SystemTime::now(),
        }
    }

    /// Sum of all parameter values.
    pub fn sum(&self) -> i64 {
        self.sum
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.snapshot.get(name)
    }

    pub fn values(&self) -> &[i64] {
        self.snapshot.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.snapshot.iter()
    }
}

/// Read-only view of shared state used by every export path.
#[derive(Debug, Clone)]
pub struct MetricsBridge {
    state: Arc<SharedState>,
}

impl MetricsBridge {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    /// One atomic read; safe to call from collector callbacks.
    pub fn sample(&self) -> MetricSample {
        MetricSample::from_snapshot(self.state.get())
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::param::{ParamSpec, ParameterSet};
    use crate::update::{UpdateEndpoint, UpdateRequest};

    fn setup() -> (UpdateEndpoint, MetricsBridge) {
        let params = ParameterSet::new(vec![
            ParamSpec::binary("a"),
            ParamSpec::binary("b"),
            ParamSpec::binary("c"),
        ])
        .unwrap();
        let state = Arc::new(SharedState::new(params));
        (
            UpdateEndpoint::new(Arc::clone(&state)),
            MetricsBridge::new(state),
        )
    }

    #[test]
    fn sample_without_writes_reports_defaults() {
        let (_, bridge) = setup();
        let s = bridge.sample();
        assert_eq!(s.values(), &[0, 0, 0]);
        assert_eq!(s.sum(), 0);
        assert_eq!(s.version(), 0);
    }

    #[test]
    fn three_single_updates_sum_to_two() {
        let (ep, bridge) = setup();
        ep.update(&UpdateRequest::single("a", "1")).unwrap();
        ep.update(&UpdateRequest::single("b", "0")).unwrap();
        ep.update(&UpdateRequest::single("c", "1")).unwrap();

        let s = bridge.sample();
        assert_eq!(s.sum(), 2);
        assert_eq!(s.version(), 3);
        assert_eq!(
            s.iter().collect::<Vec<_>>(),
            [("a", 1), ("b", 0), ("c", 1)]
        );
    }

    #[test]
    fn repeated_samples_are_stable() {
        let (ep, bridge) = setup();
        ep.update(&UpdateRequest::single("b", 1)).unwrap();
        let first = bridge.sample();
        let second = bridge.sample();
        assert_eq!(first.values(), second.values());
        assert_eq!(first.version(), second.version());
    }
}
