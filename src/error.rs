//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! [`TransportError`] is kept separate: transport failures are absorbed at
//! the connection level and never cross into the delivery loop.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 3001,
///     "message": "bus is not running",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Input / config  | 400 Bad Request              |
/// | 2000–2999 | Bus state       | 409 Conflict / 503 Unavailable |
/// | 3000–3999 | Server          | 500 / 502                    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The bus is stopped (or stopping) and refuses new connections.
    #[error("bus is not running")]
    BusNotRunning,

    /// `start` was called on a bus that has already been started.
    #[error("bus already started")]
    AlreadyStarted,

    /// The shared channel failed (connection lost, subscription closed, ...).
    #[error("bus source error: {0}")]
    BusSource(String),

    /// A record read from the shared channel did not have the expected shape.
    #[error("malformed bus record: {0}")]
    MalformedRecord(String),

    /// An envelope could not be serialized for the wire.
    #[error("encode error: {0}")]
    Encode(String),

    /// A configuration value is missing or invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidConfig(_) => 1001,
            Self::BusNotRunning => 2001,
            Self::AlreadyStarted => 2002,
            Self::BusSource(_) => 3001,
            Self::MalformedRecord(_) => 3002,
            Self::Encode(_) => 3003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Self::BusNotRunning => StatusCode::SERVICE_UNAVAILABLE,
            Self::AlreadyStarted => StatusCode::CONFLICT,
            Self::BusSource(_) | Self::MalformedRecord(_) => StatusCode::BAD_GATEWAY,
            Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(err: redis::RedisError) -> Self {
        Self::BusSource(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Failure on one peer's transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the connection, or it was already closed locally.
    #[error("transport closed")]
    Closed,

    /// Reading from or writing to the socket failed.
    #[error("transport failure: {0}")]
    Io(String),
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn bus_not_running_maps_to_503() {
        let err = GatewayError::BusNotRunning;
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), 2001);
    }

    #[test]
    fn source_failures_map_to_bad_gateway() {
        assert_eq!(
            GatewayError::BusSource("down".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::MalformedRecord("short".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn into_response_carries_status() {
        let response = GatewayError::AlreadyStarted.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn transport_error_display() {
        assert_eq!(TransportError::Closed.to_string(), "transport closed");
        assert_eq!(
            TransportError::Io("reset".to_string()).to_string(),
            "transport failure: reset"
        );
    }
}
