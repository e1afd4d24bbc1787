//! Update operation: validate every field, then apply all of them or none.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::param::ParameterSet;
use crate::state::{SharedState, Snapshot};
use crate::validate::{validate_at, Accepted, RawValue};

/// Per-parameter slot of a structured update.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Slot {
    /// Field omitted: keep the current value.
    #[default]
    Absent,
    /// Field provided (possibly `null`, which the domain check rejects).
    Present(RawValue),
}

/// Update request carrying one or more `(name, raw)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRequest {
    pairs: Vec<(String, RawValue)>,
}

impl UpdateRequest {
    /// Single path-addressed field.
    pub fn single(name: impl Into<String>, raw: impl Into<RawValue>) -> Self {
        Self {
            pairs: vec![(name.into(), raw.into())],
        }
    }

    /// Builder for programmatic multi-field requests.
    pub fn with(mut self, name: impl Into<String>, raw: impl Into<RawValue>) -> Self {
        self.pairs.push((name.into(), raw.into()));
        self
    }

    /// Structured payload: a JSON object keyed by parameter name.
    pub fn from_json_slice(body: &[u8]) -> Result<Self> {
        let v: Value = serde_json::from_slice(body)
            .map_err(|e| BridgeError::MalformedRequest(format!("invalid json: {e}")))?;
        let Value::Object(map) = v else {
            return Err(BridgeError::MalformedRequest(
                "payload must be a json object".into(),
            ));
        };
        Ok(Self {
            pairs: map
                .iter()
                .map(|(k, v)| (k.clone(), RawValue::from_json(v)))
                .collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, RawValue)] {
        &self.pairs
    }

    /// One slot per declared parameter, in declaration order.
    pub fn slots(&self, params: &ParameterSet) -> Result<Vec<Slot>> {
        let mut slots = vec![Slot::Absent; params.len()];
        for (name, raw) in &self.pairs {
            let index = params
                .index_of(name)
                .ok_or_else(|| BridgeError::UnknownParameter(name.clone()))?;
            if slots[index] != Slot::Absent {
                return Err(BridgeError::MalformedRequest(format!(
                    "parameter {name} given more than once"
                )));
            }
            slots[index] = Slot::Present(raw.clone());
        }
        Ok(slots)
    }
}

/// Applies update requests to shared state.
#[derive(Debug, Clone)]
pub struct UpdateEndpoint {
    state: Arc<SharedState>,
}

impl UpdateEndpoint {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Validate every provided field; apply them in one write only if all pass.
    pub fn update(&self, req: &UpdateRequest) -> Result<Snapshot> {
        let params = self.state.params();
        let slots = req.slots(params)?;

        let mut batch: Vec<Accepted> = Vec::with_capacity(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            if let Slot::Present(raw) = slot {
                batch.push(validate_at(params, index, raw)?);
            }
        }

        self.state.apply(&batch)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::error::ClientCode;
    use crate::param::ParamSpec;

    fn endpoint() -> UpdateEndpoint {
        let params = ParameterSet::new(vec![
            ParamSpec::binary("paramA"),
            ParamSpec::binary("paramB"),
            ParamSpec::binary("paramC"),
        ])
        .unwrap();
        UpdateEndpoint::new(Arc::new(SharedState::new(params)))
    }

    #[test]
    fn omitted_fields_keep_their_values() {
        let ep = endpoint();
        ep.update(&UpdateRequest::single("paramB", 1)).unwrap();

        let req = UpdateRequest::from_json_slice(br#"{"paramA":1}"#).unwrap();
        let snap = ep.update(&req).unwrap();
        assert_eq!(snap.values(), &[1, 1, 0]);
    }

    #[test]
    fn one_bad_field_rejects_the_whole_request() {
        let ep = endpoint();
        let req = UpdateRequest::from_json_slice(br#"{"paramA":1,"paramB":2}"#).unwrap();
        let err = ep.update(&req).unwrap_err();
        assert_eq!(err.client_code(), ClientCode::OutOfDomain);
        assert_eq!(ep.state().get().values(), &[0, 0, 0]);
        assert_eq!(ep.state().get().version(), 0);
    }

    #[test]
    fn unknown_field_rejects_the_whole_request() {
        let ep = endpoint();
        let req = UpdateRequest::from_json_slice(br#"{"paramA":1,"paramZ":0}"#).unwrap();
        assert_eq!(
            ep.update(&req).unwrap_err().client_code(),
            ClientCode::UnknownParameter
        );
        assert_eq!(ep.state().get().get("paramA"), Some(0));
    }

    #[test]
    fn explicit_null_is_present_and_rejected() {
        let req = UpdateRequest::from_json_slice(br#"{"paramC":null}"#).unwrap();
        let ep = endpoint();
        assert_eq!(
            req.slots(ep.state().params()).unwrap()[2],
            Slot::Present(RawValue::Other("null".into()))
        );
        assert_eq!(
            ep.update(&req).unwrap_err().client_code(),
            ClientCode::OutOfDomain
        );
    }

    #[test]
    fn malformed_payloads() {
        let bodies: [&[u8]; 4] = [b"{", b"[1,2]", b"", b"7"];
        for body in bodies {
            let err = UpdateRequest::from_json_slice(body).unwrap_err();
            assert_eq!(err.client_code(), ClientCode::MalformedRequest);
        }
    }

    #[test]
    fn duplicate_names_are_malformed() {
        let ep = endpoint();
        let req = UpdateRequest::single("paramA", 1).with("paramA", 0);
        assert_eq!(
            ep.update(&req).unwrap_err().client_code(),
            ClientCode::MalformedRequest
        );
    }

    #[test]
    fn replay_is_idempotent_on_values() {
        let ep = endpoint();
        let req = UpdateRequest::single("paramA", 1).with("paramC", "1");
        let first = ep.update(&req).unwrap();
        let second = ep.update(&req).unwrap();
        assert_eq!(first.values(), second.values());
    }

    #[test]
    fn empty_object_is_a_no_op() {
        let ep = endpoint();
        let req = UpdateRequest::from_json_slice(b"{}").unwrap();
        assert!(req.is_empty());
        let snap = ep.update(&req).unwrap();
        assert_eq!(snap.version(), 0);
    }
}
