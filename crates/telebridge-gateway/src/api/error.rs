use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use telebridge_core::{BridgeError, ClientCode};

/// HTTP face of `BridgeError`.
#[derive(Debug)]
pub struct ApiError(pub BridgeError);

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.client_code() {
            ClientCode::MalformedRequest | ClientCode::OutOfDomain => StatusCode::BAD_REQUEST,
            ClientCode::UnknownParameter => StatusCode::NOT_FOUND,
            ClientCode::SinkUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ClientCode::InvalidConfig | ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.0.client_code().as_str(),
            "message": self.0.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
