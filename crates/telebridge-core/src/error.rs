//! Shared error type across telebridge crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Payload could not be parsed.
    MalformedRequest,
    /// Value rejected by the parameter's domain.
    OutOfDomain,
    /// Parameter name is not tracked.
    UnknownParameter,
    /// Metrics sink could not be reached.
    SinkUnavailable,
    /// Startup configuration is invalid.
    InvalidConfig,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::MalformedRequest => "MALFORMED_REQUEST",
            ClientCode::OutOfDomain => "OUT_OF_DOMAIN",
            ClientCode::UnknownParameter => "UNKNOWN_PARAMETER",
            ClientCode::SinkUnavailable => "SINK_UNAVAILABLE",
            ClientCode::InvalidConfig => "INVALID_CONFIG",
            ClientCode::Internal => "INTERNAL",
        }
    }

    /// Whether the caller (rather than the server) is at fault.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ClientCode::MalformedRequest | ClientCode::OutOfDomain | ClientCode::UnknownParameter
        )
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("value {value} is outside the domain of {name} ({domain})")]
    OutOfDomain {
        name: String,
        value: String,
        domain: String,
    },
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            BridgeError::MalformedRequest(_) => ClientCode::MalformedRequest,
            BridgeError::OutOfDomain { .. } => ClientCode::OutOfDomain,
            BridgeError::UnknownParameter(_) => ClientCode::UnknownParameter,
            BridgeError::SinkUnavailable(_) => ClientCode::SinkUnavailable,
            BridgeError::InvalidConfig(_) => ClientCode::InvalidConfig,
            BridgeError::Internal(_) => ClientCode::Internal,
        }
    }
}
