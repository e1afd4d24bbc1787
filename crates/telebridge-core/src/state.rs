//! Shared parameter state.
//!
//! One mutex guards every value plus the write version, so a reader observes
//! either all of a write or none of it. Critical sections copy or assign a
//! handful of integers and never block on anything else.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{BridgeError, Result};
use crate::param::ParameterSet;
use crate::validate::{self, Accepted, RawValue};

#[derive(Debug)]
struct Values {
    current: Vec<i64>,
    version: u64,
}

/// Current value of every tracked parameter.
#[derive(Debug)]
pub struct SharedState {
    params: ParameterSet,
    values: Mutex<Values>,
}

impl SharedState {
    /// All parameters start at their configured defaults, version 0.
    pub fn new(params: ParameterSet) -> Self {
        let current = params.defaults();
        Self {
            params,
            values: Mutex::new(Values {
                current,
                version: 0,
            }),
        }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Point-in-time consistent copy of all values.
    pub fn get(&self) -> Snapshot {
        let guard = self.lock();
        Snapshot {
            params: self.params.clone(),
            values: guard.current.clone(),
            version: guard.version,
        }
    }

    /// Validate and write a single parameter.
    pub fn set(&self, name: &str, value: i64) -> Result<Snapshot> {
        let accepted = validate::validate(&self.params, name, &RawValue::Int(value))?;
        self.apply(&[accepted])
    }

    /// Apply a validated batch as one write. An empty batch is a read.
    pub fn apply(&self, batch: &[Accepted]) -> Result<Snapshot> {
        if let Some(bad) = batch.iter().find(|a| a.index >= self.params.len()) {
            return Err(BridgeError::Internal(format!(
                "accepted value for index {} does not belong to this state",
                bad.index
            )));
        }

        let mut guard = self.lock();
        if !batch.is_empty() {
            for a in batch {
                guard.current[a.index] = a.value;
            }
            guard.version += 1;
        }
        Ok(Snapshot {
            params: self.params.clone(),
            values: guard.current.clone(),
            version: guard.version,
        })
    }

    // Values are plain integers assigned in full, so a poisoned lock still
    // holds a consistent vector.
    fn lock(&self) -> MutexGuard<'_, Values> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Immutable copy of the parameter values at one version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    params: ParameterSet,
    values: Vec<i64>,
    version: u64,
}

impl Snapshot {
    /// Number of writes applied before this snapshot was taken.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.params.index_of(name).map(|i| self.values[i])
    }

    /// Values in declaration order.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.params.names().zip(self.values.iter().copied())
    }

    /// Sum of all values. Cannot overflow: `ParameterSet::new` rejects
    /// domains whose combined bounds leave the i64 range.
    pub fn sum(&self) -> i64 {
        self.values.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::error::ClientCode;
    use crate::param::{Domain, ParamSpec};

    fn state() -> SharedState {
        SharedState::new(
            ParameterSet::new(vec![
                ParamSpec::binary("a"),
                ParamSpec::binary("b"),
                ParamSpec::binary("c"),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn starts_at_defaults() {
        let snap = state().get();
        assert_eq!(snap.values(), &[0, 0, 0]);
        assert_eq!(snap.version(), 0);
    }

    #[test]
    fn custom_defaults_are_honored() {
        let mut spec = ParamSpec::binary("level");
        spec.domain = Domain::Range { min: 0, max: 10 };
        spec.default = 4;
        let st = SharedState::new(ParameterSet::new(vec![spec]).unwrap());
        assert_eq!(st.get().get("level"), Some(4));
    }

    #[test]
    fn set_then_get_returns_written_value() {
        let st = state();
        st.set("b", 1).unwrap();
        let snap = st.get();
        assert_eq!(snap.get("b"), Some(1));
        assert_eq!(snap.get("a"), Some(0));
        assert_eq!(snap.version(), 1);
    }

    #[test]
    fn set_rejects_unknown_and_out_of_domain() {
        let st = state();
        assert_eq!(
            st.set("nope", 1).unwrap_err().client_code(),
            ClientCode::UnknownParameter
        );
        assert_eq!(
            st.set("a", 5).unwrap_err().client_code(),
            ClientCode::OutOfDomain
        );
        assert_eq!(st.get().version(), 0);
    }

    #[test]
    fn sum_at_the_edge_of_the_admitted_range() {
        let mut a = ParamSpec::binary("a");
        a.domain = Domain::Range { min: 0, max: i64::MAX - 1 };
        let st = SharedState::new(ParameterSet::new(vec![a, ParamSpec::binary("b")]).unwrap());

        st.set("a", i64::MAX - 1).unwrap();
        st.set("b", 1).unwrap();
        assert_eq!(st.get().sum(), i64::MAX);
    }

    #[test]
    fn empty_batch_does_not_bump_version() {
        let st = state();
        let snap = st.apply(&[]).unwrap();
        assert_eq!(snap.version(), 0);
    }

    #[test]
    fn foreign_accepted_value_is_refused() {
        let st = state();
        let bogus = Accepted { index: 9, value: 1 };
        assert_eq!(
            st.apply(&[bogus]).unwrap_err().client_code(),
            ClientCode::Internal
        );
    }
}
