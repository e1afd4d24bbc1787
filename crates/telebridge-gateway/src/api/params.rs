//! Parameter endpoints.
//!
//! - `POST /update`                 : JSON object, optional fields, all-or-nothing
//! - `PUT|POST /params/:name/:value`: single field
//! - `GET /params`                  : current snapshot
//! - `GET /params/:name`            : one value

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use bytes::Bytes;
use serde::Serialize;

use telebridge_core::{BridgeError, Snapshot, UpdateRequest};

use super::error::ApiError;
use crate::app_state::{AppState, UpdateForm};

#[derive(Debug, Serialize)]
pub struct SnapshotBody {
    pub values: BTreeMap<String, i64>,
    pub sum: i64,
    pub version: u64,
}

impl From<&Snapshot> for SnapshotBody {
    fn from(snap: &Snapshot) -> Self {
        Self {
            values: snap.iter().map(|(k, v)| (k.to_string(), v)).collect(),
            sum: snap.sum(),
            version: snap.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ParamBody {
    pub name: String,
    pub value: i64,
    pub version: u64,
}

pub async fn update_json(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<SnapshotBody>, ApiError> {
    let req = UpdateRequest::from_json_slice(&body)?;
    let snap = app.apply(UpdateForm::Json, &req)?;
    Ok(Json(SnapshotBody::from(&snap)))
}

pub async fn update_path(
    State(app): State<AppState>,
    Path((name, value)): Path<(String, String)>,
) -> Result<Json<SnapshotBody>, ApiError> {
    let req = UpdateRequest::single(name, value.as_str());
    let snap = app.apply(UpdateForm::Path, &req)?;
    Ok(Json(SnapshotBody::from(&snap)))
}

pub async fn list(State(app): State<AppState>) -> Json<SnapshotBody> {
    Json(SnapshotBody::from(&app.snapshot()))
}

pub async fn get_one(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ParamBody>, ApiError> {
    let snap = app.snapshot();
    let value = snap
        .get(&name)
        .ok_or_else(|| BridgeError::UnknownParameter(name.clone()))?;
    Ok(Json(ParamBody {
        name,
        value,
        version: snap.version(),
    }))
}
