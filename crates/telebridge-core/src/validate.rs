//! Validation policy: raw input -> accepted value.
//!
//! Pure functions only. Nothing in this module touches shared state; a value
//! reaches [`crate::state::SharedState`] only as an [`Accepted`], which can be
//! constructed here and nowhere else.

use std::fmt;

use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::param::ParameterSet;

/// Untyped input as it arrived on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// JSON integer.
    Int(i64),
    /// Path segment or JSON string; parsed as base-10 after trimming.
    Text(String),
    /// Any other JSON value (float, bool, null, array, object).
    Other(String),
}

impl RawValue {
    /// Classify a JSON value without interpreting it.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Int(i),
                None => RawValue::Other(n.to_string()),
            },
            Value::String(s) => RawValue::Text(s.clone()),
            other => RawValue::Other(other.to_string()),
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            RawValue::Int(i) => Some(*i),
            RawValue::Text(s) => s.trim().parse().ok(),
            RawValue::Other(_) => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Int(v.into())
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Int(i) => write!(f, "{i}"),
            RawValue::Text(s) => write!(f, "{s:?}"),
            RawValue::Other(s) => f.write_str(s),
        }
    }
}

/// A value that passed its parameter's domain check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub(crate) index: usize,
    pub(crate) value: i64,
}

impl Accepted {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

/// Validate one `(name, raw)` pair against the parameter set.
pub fn validate(params: &ParameterSet, name: &str, raw: &RawValue) -> Result<Accepted> {
    let index = params
        .index_of(name)
        .ok_or_else(|| BridgeError::UnknownParameter(name.to_string()))?;
    validate_at(params, index, raw)
}

pub(crate) fn validate_at(params: &ParameterSet, index: usize, raw: &RawValue) -> Result<Accepted> {
    let spec = params
        .get(index)
        .ok_or_else(|| BridgeError::Internal(format!("parameter index {index} out of bounds")))?;

    match raw.as_int() {
        Some(value) if spec.domain.admits(value) => Ok(Accepted { index, value }),
        _ => Err(BridgeError::OutOfDomain {
            name: spec.name.clone(),
            value: raw.to_string(),
            domain: spec.domain.to_string(),
        }),
    }
}
