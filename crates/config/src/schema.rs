//! Config schema for the hub process.
//!
//! All sections default so a missing or partial config file always yields a
//! runnable configuration.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MochiConfig {
    pub ws: WsConfig,
    pub http: HttpConfig,
    pub db: DbConfig,
    pub security: SecurityConfig,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
}

/// WebSocket listener for connector traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            tls: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert: String,
    pub key: String,
}

/// HTTP admin API listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub cors: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            cors: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// SQLite database path, or `sqlite::memory:` for tests.
    pub path: String,
    /// Table name prefix.
    pub prefix: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: "mochi-link.db".into(),
            prefix: "mochi_".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Token lifetime in seconds; 0 means never expires.
    #[serde(rename = "tokenExpiry")]
    pub token_expiry: u64,
    #[serde(rename = "maxConnections")]
    pub max_connections: usize,
    #[serde(rename = "rateLimit")]
    pub rate_limit: RateLimitConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_expiry: 0,
            max_connections: 256,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    #[serde(rename = "windowMs")]
    pub window_ms: u64,
    #[serde(rename = "maxRequests")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    #[serde(rename = "reportIntervalSec")]
    pub report_interval_sec: u64,
    #[serde(rename = "historyRetentionDays")]
    pub history_retention_days: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            report_interval_sec: 60,
            history_retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of debug, info, warn, error.
    pub level: String,
    #[serde(rename = "auditRetentionDays")]
    pub audit_retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            audit_retention_days: 90,
        }
    }
}
