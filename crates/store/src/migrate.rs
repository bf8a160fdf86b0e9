//! Schema creation with a runtime table prefix.

use sqlx::SqlitePool;

use crate::store::Tables;

/// Create all tables and indexes if they do not exist.
pub async fn run_migrations(pool: &SqlitePool, tables: &Tables) -> Result<(), sqlx::Error> {
    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {servers} (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                core_type TEXT NOT NULL,
                core_name TEXT NOT NULL,
                core_version TEXT,
                connection_mode TEXT NOT NULL,
                connection_config TEXT,
                status TEXT NOT NULL DEFAULT 'offline',
                owner_id TEXT NOT NULL,
                tags TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_seen INTEGER
            )",
            servers = tables.servers
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {tokens} (
                id TEXT PRIMARY KEY,
                server_id TEXT NOT NULL,
                token TEXT NOT NULL,
                token_hash TEXT NOT NULL,
                ip_whitelist TEXT,
                encryption_config TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                last_used_at INTEGER
            )",
            tokens = tables.api_tokens
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{tokens}_hash ON {tokens} (token_hash)",
            tokens = tables.api_tokens
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{tokens}_server ON {tokens} (server_id)",
            tokens = tables.api_tokens
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {acl} (
                user_id TEXT NOT NULL,
                server_id TEXT NOT NULL,
                role TEXT NOT NULL,
                permissions TEXT,
                granted_by TEXT NOT NULL,
                granted_at INTEGER NOT NULL,
                expires_at INTEGER,
                PRIMARY KEY (user_id, server_id)
            )",
            acl = tables.server_acl
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {audit} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                server_id TEXT,
                operation TEXT NOT NULL,
                operation_data TEXT,
                result TEXT NOT NULL,
                error_message TEXT,
                ip_address TEXT,
                user_agent TEXT,
                timestamp INTEGER NOT NULL
            )",
            audit = tables.audit_logs
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{audit}_ts ON {audit} (timestamp)",
            audit = tables.audit_logs
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {pending} (
                id TEXT PRIMARY KEY,
                server_id TEXT NOT NULL,
                operation_type TEXT NOT NULL,
                target TEXT NOT NULL,
                parameters TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                scheduled_at INTEGER,
                executed_at INTEGER
            )",
            pending = tables.pending_operations
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{pending}_server ON {pending} (server_id, created_at)",
            pending = tables.pending_operations
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {bindings} (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                server_id TEXT NOT NULL,
                binding_type TEXT NOT NULL,
                config TEXT,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                last_used_at INTEGER,
                UNIQUE (group_id, server_id, binding_type)
            )",
            bindings = tables.server_bindings
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {players} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT,
                xuid TEXT,
                name TEXT NOT NULL,
                display_name TEXT,
                last_server_id TEXT NOT NULL,
                last_seen INTEGER NOT NULL,
                identity_confidence REAL NOT NULL DEFAULT 1.0,
                identity_markers TEXT,
                is_premium INTEGER,
                device_type TEXT,
                identity_conflict INTEGER NOT NULL DEFAULT 0
            )",
            players = tables.player_cache
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{players}_name ON {players} (name)",
            players = tables.player_cache
        ),
    ];

    for stmt in &statements {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
