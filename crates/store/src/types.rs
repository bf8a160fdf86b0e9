//! Persistent record shapes.
//!
//! These are the durable entities; runtime connection state lives in the hub
//! and is recreated on reconnect, never persisted.

use serde::{Deserialize, Serialize};

// ── Server ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreType {
    Java,
    Bedrock,
}

impl CoreType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Java => "Java",
            Self::Bedrock => "Bedrock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Java" => Some(Self::Java),
            "Bedrock" => Some(Self::Bedrock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    Plugin,
    Rcon,
    Terminal,
}

impl ConnectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Rcon => "rcon",
            Self::Terminal => "terminal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plugin" => Some(Self::Plugin),
            "rcon" => Some(Self::Rcon),
            "terminal" => Some(Self::Terminal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Offline,
    Connecting,
    Online,
    Error,
    Maintenance,
}

impl ServerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Connecting => "connecting",
            Self::Online => "online",
            Self::Error => "error",
            Self::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offline" => Some(Self::Offline),
            "connecting" => Some(Self::Connecting),
            "online" => Some(Self::Online),
            "error" => Some(Self::Error),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

/// A registered server in the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub core_type: CoreType,
    pub core_name: String,
    pub core_version: Option<String>,
    pub connection_mode: ConnectionMode,
    pub connection_config: serde_json::Value,
    pub status: ServerStatus,
    pub owner_id: String,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen: Option<i64>,
}

/// Partial update for a server record; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerUpdate {
    pub name: Option<String>,
    pub core_name: Option<String>,
    pub core_version: Option<String>,
    pub connection_config: Option<serde_json::Value>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ServerStatus>,
}

/// List filter for servers.
#[derive(Debug, Clone, Default)]
pub struct ServerFilter {
    pub status: Option<ServerStatus>,
    pub owner_id: Option<String>,
    pub tag: Option<String>,
}

// ── API token ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTokenRecord {
    pub id: String,
    pub server_id: String,
    /// 64-hex secret, stored for operator retrieval and equality check.
    pub token: String,
    /// SHA-256 hex of the token; secondary lookup index.
    pub token_hash: String,
    /// Plain IPs or CIDR blocks; empty means any.
    pub ip_whitelist: Vec<String>,
    pub encryption_config: Option<serde_json::Value>,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub last_used_at: Option<i64>,
}

// ── ACL ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclRole {
    Owner,
    Admin,
    Operator,
    Viewer,
}

impl AclRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "operator" => Some(Self::Operator),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    pub user_id: String,
    pub server_id: String,
    pub role: AclRole,
    /// Explicit permission allowlist overriding the role mapping.
    pub permissions: Vec<String>,
    pub granted_by: String,
    pub granted_at: i64,
    pub expires_at: Option<i64>,
}

// ── Audit ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
    Error,
}

impl AuditResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic, assigned by the store on append.
    pub id: i64,
    pub user_id: Option<String>,
    pub server_id: Option<String>,
    /// Dotted operation name, e.g. `server.create`.
    pub operation: String,
    pub operation_data: serde_json::Value,
    pub result: AuditResult,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: i64,
}

/// Audit entry as submitted by callers; the store assigns id and timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewAudit {
    pub user_id: Option<String>,
    pub server_id: Option<String>,
    pub operation: String,
    pub operation_data: serde_json::Value,
    pub result: Option<AuditResult>,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub server_id: Option<String>,
    pub operation: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

// ── Pending operations ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingOpStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl PendingOpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A mutation queued because its target server was offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOpRecord {
    pub id: String,
    pub server_id: String,
    /// e.g. `whitelist.add`, `ban.remove`, `player.kick`.
    pub operation_type: String,
    pub target: String,
    pub parameters: serde_json::Value,
    pub status: PendingOpStatus,
    pub created_at: i64,
    pub scheduled_at: Option<i64>,
    pub executed_at: Option<i64>,
}

// ── Group bindings ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingType {
    Chat,
    Event,
    Command,
    Monitoring,
    Full,
}

impl BindingType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Event => "event",
            Self::Command => "command",
            Self::Monitoring => "monitoring",
            Self::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(Self::Chat),
            "event" => Some(Self::Event),
            "command" => Some(Self::Command),
            "monitoring" => Some(Self::Monitoring),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStatus {
    Active,
    Inactive,
    Error,
}

impl BindingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingRecord {
    pub id: String,
    pub group_id: String,
    pub server_id: String,
    pub binding_type: BindingType,
    /// Per-type options (filters, formats, rate limits, event types).
    pub config: serde_json::Value,
    pub created_by: String,
    pub created_at: i64,
    pub status: BindingStatus,
    pub last_used_at: Option<i64>,
}

// ── Player cache ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityMarkers {
    pub ip: Option<String>,
    pub device: Option<String>,
    pub first_seen: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerCacheEntry {
    pub uuid: Option<String>,
    pub xuid: Option<String>,
    pub name: String,
    pub display_name: Option<String>,
    pub last_server_id: String,
    pub last_seen: i64,
    /// In `[0, 1]`; below 1 when markers conflict.
    pub identity_confidence: f64,
    pub identity_markers: IdentityMarkers,
    pub is_premium: Option<bool>,
    pub device_type: Option<String>,
    pub identity_conflict: bool,
}

// ── Pagination ───────────────────────────────────────────────────────────────

/// Page selector shared by the store and the HTTP surface.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Page {
    /// Clamp to the documented ranges: page ≥ 1, limit 1–100.
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, 100),
        }
    }

    pub fn offset(self) -> i64 {
        let p = self.clamped();
        i64::from(p.page - 1) * i64::from(p.limit)
    }
}
