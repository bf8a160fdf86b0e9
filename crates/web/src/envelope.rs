//! Uniform response envelope and error mapping for the admin API.

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Serialize,
};

use mochi_common::{ErrorKind, ServiceError, now_ms};

/// Every response body is wrapped in this shape.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Success with a payload.
pub fn ok(data: serde_json::Value) -> Response {
    with_status(StatusCode::OK, data)
}

pub fn with_status(status: StatusCode, data: serde_json::Value) -> Response {
    let body = Envelope {
        success: true,
        data: Some(data),
        error: None,
        message: None,
        request_id: uuid::Uuid::new_v4().to_string(),
        timestamp: now_ms(),
    };
    (status, Json(body)).into_response()
}

/// Operator-facing API failure.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// Override for non-taxonomy codes (e.g. VERSION_NOT_SUPPORTED).
    pub code_override: Option<&'static str>,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code_override: None,
            details: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Auth, "missing or invalid bearer token")
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn version_not_supported(supported: &[&str]) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: "requested API version is not supported".into(),
            code_override: Some("VERSION_NOT_SUPPORTED"),
            details: Some(serde_json::json!({ "supported": supported })),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self::new(err.kind, err.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // Internal details never leak to operators.
        let message = if self.kind == ErrorKind::Internal {
            "internal error".to_string()
        } else {
            self.message
        };
        let mut error = serde_json::json!({
            "code": self.code_override.unwrap_or(self.kind.code()),
            "message": message,
        });
        if let Some(details) = self.details
            && let Some(map) = error.as_object_mut()
        {
            map.insert("details".into(), details);
        }
        let body = serde_json::json!({
            "success": false,
            "error": error,
            "requestId": uuid::Uuid::new_v4().to_string(),
            "timestamp": now_ms(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult = Result<Response, ApiError>;
