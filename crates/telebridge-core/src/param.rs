//! Parameter model: names, defaults and accepted domains.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Accepted-value predicate for a parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum Domain {
    /// `{0, 1}`.
    #[default]
    Binary,
    /// Inclusive integer range.
    Range { min: i64, max: i64 },
    /// Explicit value set.
    OneOf { values: Vec<i64> },
}

impl Domain {
    pub fn admits(&self, value: i64) -> bool {
        match self {
            Domain::Binary => value == 0 || value == 1,
            Domain::Range { min, max } => (*min..=*max).contains(&value),
            Domain::OneOf { values } => values.contains(&value),
        }
    }

    /// Smallest and largest admitted value. `None` for an empty `one_of`.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        match self {
            Domain::Binary => Some((0, 1)),
            Domain::Range { min, max } => Some((*min, *max)),
            Domain::OneOf { values } => Some((*values.iter().min()?, *values.iter().max()?)),
        }
    }

    /// Reject domains that admit nothing.
    pub fn check(&self) -> Result<()> {
        match self {
            Domain::Binary => Ok(()),
            Domain::Range { min, max } if min > max => Err(BridgeError::InvalidConfig(format!(
                "range domain min ({min}) must not exceed max ({max})"
            ))),
            Domain::Range { .. } => Ok(()),
            Domain::OneOf { values } if values.is_empty() => Err(BridgeError::InvalidConfig(
                "one_of domain must list at least one value".into(),
            )),
            Domain::OneOf { .. } => Ok(()),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Binary => f.write_str("0 or 1"),
            Domain::Range { min, max } => write!(f, "{min}..={max}"),
            Domain::OneOf { values } => {
                let list = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "one of [{list}]")
            }
        }
    }
}

/// Static description of one tracked parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub default: i64,
    pub domain: Domain,
}

impl ParamSpec {
    /// Binary parameter defaulting to 0.
    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            default: 0,
            domain: Domain::Binary,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Ordered, immutable list of parameter specs.
///
/// Cheap to clone; positions are stable for the process lifetime and are used
/// as indices into the value vector held by [`crate::state::SharedState`].
#[derive(Debug, Clone)]
pub struct ParameterSet {
    specs: Arc<[ParamSpec]>,
}

impl ParameterSet {
    pub fn new(specs: Vec<ParamSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "at least one parameter is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        let (mut low, mut high) = (0i128, 0i128);
        for spec in &specs {
            if spec.name.is_empty() {
                return Err(BridgeError::InvalidConfig(
                    "parameter name must not be empty".into(),
                ));
            }
            if !spec
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            {
                return Err(BridgeError::InvalidConfig(format!(
                    "parameter name {:?} may only contain [A-Za-z0-9_.-]",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(BridgeError::InvalidConfig(format!(
                    "duplicate parameter name: {}",
                    spec.name
                )));
            }
            spec.domain.check()?;
            if !spec.domain.admits(spec.default) {
                return Err(BridgeError::InvalidConfig(format!(
                    "default {} of {} is outside its domain ({})",
                    spec.default, spec.name, spec.domain
                )));
            }
            if let Some((min, max)) = spec.domain.bounds() {
                low += i128::from(min);
                high += i128::from(max);
            }
        }

        // The derived sum is an i64 for every admissible combination.
        if low < i128::from(i64::MIN) || high > i128::from(i64::MAX) {
            return Err(BridgeError::InvalidConfig(format!(
                "parameter domains allow a sum in {low}..={high}, outside the i64 range"
            )));
        }

        Ok(Self { specs: specs.into() })
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&ParamSpec> {
        self.specs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamSpec> {
        self.specs.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    pub(crate) fn defaults(&self) -> Vec<i64> {
        self.specs.iter().map(|s| s.default).collect()
    }
}
