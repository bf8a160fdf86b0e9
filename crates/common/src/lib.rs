//! Shared plumbing for the Mochi-Link hub: error context helpers, the
//! operator-facing error taxonomy, identifier validation, and time helpers.

pub mod error;
pub mod ids;
pub mod service_error;

pub use {
    error::{Error, FromMessage, Result},
    ids::{is_valid_server_id, sanitize_player_target},
    service_error::{ErrorKind, ServiceError, ServiceResult},
};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
