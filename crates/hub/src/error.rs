use thiserror::Error;

/// Why an outbound request to a connector did not produce a response.
///
/// Cloneable so single-flight waiters can all observe the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },

    #[error("hub is shutting down")]
    ShuttingDown,
}

impl RequestError {
    /// Map onto the operator-facing taxonomy.
    pub fn to_service_error(&self) -> mochi_common::ServiceError {
        use mochi_common::{ErrorKind, ServiceError};
        match self {
            Self::Timeout => ServiceError::new(ErrorKind::Timeout, self.to_string()),
            Self::ConnectionClosed | Self::ShuttingDown => {
                ServiceError::new(ErrorKind::ServerOffline, self.to_string())
            },
            Self::Protocol(_) => ServiceError::new(ErrorKind::Protocol, self.to_string()),
            Self::Remote { .. } => ServiceError::new(ErrorKind::Protocol, self.to_string()),
        }
    }
}
