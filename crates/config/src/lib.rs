//! Configuration schema and loading for the hub process.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{
        DbConfig, HttpConfig, LoggingConfig, MochiConfig, MonitoringConfig, RateLimitConfig,
        SecurityConfig, TlsConfig, WsConfig,
    },
};
