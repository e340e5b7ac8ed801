//! Classification of request failures into HTTP responses.
//!
//! [`classify`] is the single place that decides status codes:
//!
//! | Failure            | Status |
//! |--------------------|--------|
//! | `AuthError`        | 401    |
//! | `ValidationError`  | 400 (413 for oversized bodies) |
//! | everything else    | 500    |

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{AuthError, GatewayError, ValidationError};

/// Body returned to clients for every 401.
pub const INVALID_TOKEN_MESSAGE: &str = "Missing or Invalid Token";

/// JSON error response returned for all error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,

    /// Machine-readable error kind (e.g., "token_expired", "missing_file")
    pub code: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        code: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            status: Some(status.as_u16()),
        }
    }
}

fn auth_code(err: &AuthError) -> &'static str {
    match err {
        AuthError::MissingToken => "missing_token",
        AuthError::MalformedHeader => "malformed_header",
        AuthError::MalformedToken(_) => "malformed_token",
        AuthError::Expired => "token_expired",
        AuthError::InvalidSignature => "invalid_signature",
        AuthError::InvalidAudience => "invalid_audience",
        AuthError::InvalidIssuer => "invalid_issuer",
        AuthError::UnknownKey { .. } => "unknown_key",
        AuthError::MissingKeyId => "missing_key_id",
        AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
        AuthError::Invalid(_) => "invalid_token",
        AuthError::KeysUnavailable(_) => "keys_unavailable",
    }
}

/// Map a failure to its status code and response body.
pub fn classify(err: &GatewayError) -> (StatusCode, ErrorResponse) {
    let (status, code, message) = match err {
        // Issuer outage is ours, not the client's.
        GatewayError::Auth(e @ AuthError::KeysUnavailable(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            auth_code(e),
            e.to_string(),
        ),
        GatewayError::Auth(e) => (
            StatusCode::UNAUTHORIZED,
            auth_code(e),
            INVALID_TOKEN_MESSAGE.to_string(),
        ),

        GatewayError::Validation(e) => {
            let (status, code) = match e {
                ValidationError::MissingFile => (StatusCode::BAD_REQUEST, "missing_file"),
                ValidationError::MultipleFiles => (StatusCode::BAD_REQUEST, "multiple_files"),
                ValidationError::Multipart(_) => (StatusCode::BAD_REQUEST, "invalid_multipart"),
                ValidationError::TooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            };
            (status, code, e.to_string())
        }

        GatewayError::Broker(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "broker_error",
            e.to_string(),
        ),

        GatewayError::Storage(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            e.to_string(),
        ),
    };

    (status, ErrorResponse::with_status(message, code, status))
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, body) = classify(&self);

        // Token contents never reach the logs; only the failure kind does.
        if status.is_server_error() {
            error!(code = %body.code, status = status.as_u16(), "Server error: {}", self);
        } else if matches!(self, GatewayError::Auth(AuthError::InvalidSignature)) {
            warn!(code = %body.code, status = status.as_u16(), "Authentication failed: {}", self);
        } else if status == StatusCode::UNAUTHORIZED {
            debug!(code = %body.code, status = status.as_u16(), "Authentication failed: {}", self);
        } else {
            warn!(code = %body.code, status = status.as_u16(), "Client error: {}", self);
        }

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
