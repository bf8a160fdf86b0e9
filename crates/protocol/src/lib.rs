//! U-WBP v2 protocol definitions and codec.
//!
//! All hub↔connector communication uses JSON frames over WebSocket. Every
//! frame carries the same field set:
//!
//! ```json
//! { "type": "request", "id": "…", "op": "…", "timestamp": 0,
//!   "version": "2.0", "data": {} }
//! ```
//!
//! The codec validates structure on every inbound frame and provides
//! constructors for the typed outbound frames.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: &str = "2.0";
pub const MAX_FRAME_BYTES: usize = 1_048_576; // 1 MiB
pub const AUTH_DEADLINE_MS: u64 = 10_000; // 10s
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000; // 30s
pub const PONG_DEADLINE_MS: u64 = 5_000; // 5s
pub const HEARTBEAT_MAX_MISSES: u32 = 2;
pub const REQUEST_TIMEOUT_MS: u64 = 30_000; // 30s
pub const SEND_QUEUE_CAPACITY: usize = 1024;

// ── Close codes ──────────────────────────────────────────────────────────────

pub mod close_codes {
    pub const NORMAL: u16 = 1000;
    pub const AUTH_TIMEOUT: u16 = 1002;
    pub const AUTH_FAILED: u16 = 1008;
    pub const FRAME_TOO_BIG: u16 = 1009;
    pub const INTERNAL: u16 = 1011;
    pub const REPLACED: u16 = 1013;
}

// ── System operations ────────────────────────────────────────────────────────

pub mod system_ops {
    pub const HANDSHAKE: &str = "system.handshake";
    pub const PING: &str = "system.ping";
    pub const PONG: &str = "system.pong";
    pub const DISCONNECT: &str = "system.disconnect";
}

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const INVALID_FRAME: &str = "INVALID_FRAME";
    pub const UNSUPPORTED_VERSION: &str = "UNSUPPORTED_VERSION";
    pub const UNSUPPORTED_OP: &str = "UNSUPPORTED_OP";
    pub const FRAME_TOO_BIG: &str = "FRAME_TOO_BIG";
    pub const SHUTTING_DOWN: &str = "SHUTTING_DOWN";
}

// ── Frame ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Request,
    Response,
    Event,
    System,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameError {
    pub code: String,
    pub message: String,
}

impl FrameError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A single U-WBP v2 wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub r#type: FrameType,
    pub id: String,
    pub op: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub version: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FrameError>,
}

impl Frame {
    fn base(r#type: FrameType, id: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            r#type,
            id: id.into(),
            op: op.into(),
            timestamp: now_ms(),
            version: PROTOCOL_VERSION.into(),
            data: serde_json::Value::Null,
            error: None,
        }
    }

    /// Build a request frame with a fresh id.
    pub fn request(op: impl Into<String>, data: serde_json::Value) -> Self {
        let mut f = Self::base(FrameType::Request, uuid::Uuid::new_v4().to_string(), op);
        f.data = data;
        f
    }

    /// Build a response correlated to `request_id`.
    pub fn response(
        request_id: impl Into<String>,
        op: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        let mut f = Self::base(FrameType::Response, request_id, op);
        f.data = data;
        f
    }

    /// Build an event frame with a fresh id.
    pub fn event(op: impl Into<String>, data: serde_json::Value) -> Self {
        let mut f = Self::base(FrameType::Event, uuid::Uuid::new_v4().to_string(), op);
        f.data = data;
        f
    }

    /// Build a system frame (handshake, ping/pong, disconnect).
    pub fn system(op: impl Into<String>, data: serde_json::Value) -> Self {
        let mut f = Self::base(FrameType::System, uuid::Uuid::new_v4().to_string(), op);
        f.data = data;
        f
    }

    /// Build an error frame correlated to `request_id` (empty id when the
    /// failure is not tied to a request).
    pub fn error(
        request_id: impl Into<String>,
        op: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut f = Self::base(FrameType::Error, request_id, op);
        f.error = Some(FrameError::new(code, message));
        f
    }

    pub fn is_system_op(&self, op: &str) -> bool {
        self.r#type == FrameType::System && self.op == op
    }

    /// Serialize to the wire representation.
    pub fn encode(&self) -> String {
        // Frame is a plain data struct; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// ── Handshake payloads ───────────────────────────────────────────────────────

/// Hub → connector handshake body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubHandshake {
    #[serde(rename = "hubVersion")]
    pub hub_version: String,
    pub capabilities: Vec<String>,
    #[serde(rename = "heartbeatIntervalMs")]
    pub heartbeat_interval_ms: u64,
    #[serde(rename = "maxFrameBytes")]
    pub max_frame_bytes: usize,
    /// How often the connector should push `monitoring.report` events.
    #[serde(rename = "reportIntervalSec")]
    pub report_interval_sec: u64,
}

/// Connector → hub handshake body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorHandshake {
    #[serde(rename = "coreType")]
    pub core_type: String,
    #[serde(rename = "coreName")]
    pub core_name: String,
    #[serde(rename = "coreVersion")]
    pub core_version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

// ── Decode ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame exceeds {MAX_FRAME_BYTES} bytes: {0}")]
    TooBig(usize),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("missing or unknown frame type")]
    BadType,
    #[error("unsupported protocol version: {0}")]
    BadVersion(String),
}

impl ProtocolError {
    /// Wire error code for replying to the peer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TooBig(_) => error_codes::FRAME_TOO_BIG,
            Self::Malformed(_) | Self::BadType => error_codes::INVALID_FRAME,
            Self::BadVersion(_) => error_codes::UNSUPPORTED_VERSION,
        }
    }
}

/// Parse and validate one inbound frame.
pub fn decode(text: &str) -> Result<Frame, ProtocolError> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::TooBig(text.len()));
    }

    // Probe the raw value first so a missing/unknown `type` or `version` is
    // reported as such rather than as a generic parse failure.
    let raw: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let type_ok = raw
        .get("type")
        .and_then(|v| v.as_str())
        .is_some_and(|t| matches!(t, "request" | "response" | "event" | "system" | "error"));
    if !type_ok {
        return Err(ProtocolError::BadType);
    }

    match raw.get("version").and_then(|v| v.as_str()) {
        Some(PROTOCOL_VERSION) => {},
        Some(other) => return Err(ProtocolError::BadVersion(other.to_string())),
        None => return Err(ProtocolError::BadVersion("missing".into())),
    }

    serde_json::from_value(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
