//! Operator-facing error taxonomy shared by the service layer and the
//! HTTP/bot surfaces.
//!
//! Every failure that crosses a component boundary is one of these kinds;
//! surfaces map kinds onto stable wire codes and HTTP statuses without
//! inspecting message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a service-layer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    /// Unauthenticated.
    Auth,
    /// Authenticated but denied.
    Permission,
    NotFound,
    Conflict,
    RateLimited,
    /// Target server is not connected and the operation does not qualify
    /// for deferral.
    ServerOffline,
    Protocol,
    Timeout,
    Internal,
}

impl ErrorKind {
    /// Stable wire code for this kind.
    pub fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Auth => "UNAUTHENTICATED",
            Self::Permission => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerOffline => "SERVER_OFFLINE",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the kind maps to on the admin API.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Auth => 401,
            Self::Permission => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RateLimited => 429,
            Self::ServerOffline => 503,
            Self::Protocol | Self::Timeout => 502,
            Self::Internal => 500,
        }
    }
}

/// A typed service-layer failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn offline(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerOffline, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Never leak internals to operators; keep the detail for the log.
    pub fn internal_logged(context: &str, source: impl std::fmt::Display) -> Self {
        tracing::error!(context, error = %source, "internal error");
        Self::new(ErrorKind::Internal, "internal error")
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::Validation.code(), "VALIDATION_ERROR");
        assert_eq!(ErrorKind::Permission.code(), "PERMISSION_DENIED");
        assert_eq!(ErrorKind::NotFound.code(), "NOT_FOUND");
        assert_eq!(ErrorKind::Conflict.code(), "CONFLICT");
        assert_eq!(ErrorKind::RateLimited.code(), "RATE_LIMITED");
    }

    #[test]
    fn http_statuses() {
        assert_eq!(ErrorKind::Validation.http_status(), 400);
        assert_eq!(ErrorKind::Auth.http_status(), 401);
        assert_eq!(ErrorKind::Permission.http_status(), 403);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::Conflict.http_status(), 409);
        assert_eq!(ErrorKind::RateLimited.http_status(), 429);
        assert_eq!(ErrorKind::Internal.http_status(), 500);
    }
}
