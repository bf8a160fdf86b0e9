//! SQLite-backed store using sqlx.

use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions};

use mochi_common::now_ms;

use crate::{
    error::{Result, StoreError},
    json,
    types::{ConnectionMode, CoreType, Page, ServerFilter, ServerRecord, ServerStatus, ServerUpdate},
};

/// Resolved table names for a configured prefix.
#[derive(Debug, Clone)]
pub struct Tables {
    pub servers: String,
    pub api_tokens: String,
    pub server_acl: String,
    pub audit_logs: String,
    pub pending_operations: String,
    pub server_bindings: String,
    pub player_cache: String,
}

impl Tables {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            servers: format!("{prefix}servers"),
            api_tokens: format!("{prefix}api_tokens"),
            server_acl: format!("{prefix}server_acl"),
            audit_logs: format!("{prefix}audit_logs"),
            pending_operations: format!("{prefix}pending_operations"),
            server_bindings: format!("{prefix}server_bindings"),
            player_cache: format!("{prefix}player_cache"),
        }
    }
}

/// Typed persistence for servers, tokens, ACL, audit, pending operations,
/// bindings, and the player cache.
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
    pub(crate) tables: Tables,
}

impl SqliteStore {
    /// Create a new store with its own connection pool and run migrations.
    pub async fn new(database_url: &str, prefix: &str) -> Result<Self> {
        // An in-memory database exists per connection; more than one
        // connection in the pool would each see an empty schema.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Self::with_pool(pool, prefix).await
    }

    /// Create a store over an existing pool and run migrations.
    pub async fn with_pool(pool: SqlitePool, prefix: &str) -> Result<Self> {
        let tables = Tables::with_prefix(prefix);
        crate::migrate::run_migrations(&pool, &tables).await?;
        Ok(Self { pool, tables })
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:", "mochi_").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ── Servers ──────────────────────────────────────────────────────────────────

impl SqliteStore {
    pub async fn create_server(&self, record: &ServerRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, name, core_type, core_name, core_version, connection_mode,
                connection_config, status, owner_id, tags, created_at, updated_at, last_seen)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.tables.servers
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.name)
            .bind(record.core_type.as_str())
            .bind(record.core_name.as_str())
            .bind(&record.core_version)
            .bind(record.connection_mode.as_str())
            .bind(json::encode(&record.connection_config))
            .bind(record.status.as_str())
            .bind(&record.owner_id)
            .bind(json::encode(&record.tags))
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.last_seen)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::classify(e, &format!("server {}", record.id)))?;
        Ok(())
    }

    pub async fn get_server(&self, id: &str) -> Result<Option<ServerRecord>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.tables.servers);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| server_from_row(&r)))
    }

    /// Paginated server listing with optional status/owner/tag filters.
    /// Returns the page plus the total match count.
    pub async fn list_servers(
        &self,
        filter: &ServerFilter,
        page: Page,
    ) -> Result<(Vec<ServerRecord>, i64)> {
        let page = page.clamped();
        let mut clauses = Vec::new();
        if filter.status.is_some() {
            clauses.push("status = ?");
        }
        if filter.owner_id.is_some() {
            clauses.push("owner_id = ?");
        }
        // Tags are a JSON array; match the quoted element.
        if filter.tag.is_some() {
            clauses.push("tags LIKE ?");
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS n FROM {}{where_sql}", self.tables.servers);
        let list_sql = format!(
            "SELECT * FROM {}{where_sql} ORDER BY created_at LIMIT ? OFFSET ?",
            self.tables.servers
        );

        let total: i64 = bind_server_filters(sqlx::query(&count_sql), filter)
            .fetch_one(&self.pool)
            .await?
            .get("n");

        let rows = bind_server_filters(sqlx::query(&list_sql), filter)
            .bind(i64::from(page.limit))
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.iter().map(server_from_row).collect(), total))
    }

    pub async fn update_server(&self, id: &str, update: &ServerUpdate) -> Result<ServerRecord> {
        let Some(mut record) = self.get_server(id).await? else {
            return Err(StoreError::NotFound(format!("server {id}")));
        };

        if let Some(ref name) = update.name {
            record.name = name.clone();
        }
        if let Some(ref core_name) = update.core_name {
            record.core_name = core_name.clone();
        }
        if update.core_version.is_some() {
            record.core_version = update.core_version.clone();
        }
        if let Some(ref cfg) = update.connection_config {
            record.connection_config = cfg.clone();
        }
        if let Some(ref tags) = update.tags {
            record.tags = tags.clone();
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        record.updated_at = now_ms();

        let sql = format!(
            "UPDATE {} SET name = ?, core_name = ?, core_version = ?, connection_config = ?,
                tags = ?, status = ?, updated_at = ? WHERE id = ?",
            self.tables.servers
        );
        sqlx::query(&sql)
            .bind(&record.name)
            .bind(&record.core_name)
            .bind(&record.core_version)
            .bind(json::encode(&record.connection_config))
            .bind(json::encode(&record.tags))
            .bind(record.status.as_str())
            .bind(record.updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn set_server_status(
        &self,
        id: &str,
        status: ServerStatus,
        last_seen: Option<i64>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET status = ?, updated_at = ?, last_seen = COALESCE(?, last_seen)
             WHERE id = ?",
            self.tables.servers
        );
        let result = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(now_ms())
            .bind(last_seen)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("server {id}")));
        }
        Ok(())
    }

    /// Delete a server and everything hanging off it in one transaction.
    pub async fn delete_server(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.tables.servers))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("server {id}")));
        }

        for table in [
            &self.tables.api_tokens,
            &self.tables.server_acl,
            &self.tables.pending_operations,
            &self.tables.server_bindings,
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE server_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_server_filters<'q>(mut q: SqliteQuery<'q>, filter: &ServerFilter) -> SqliteQuery<'q> {
    if let Some(status) = filter.status {
        q = q.bind(status.as_str());
    }
    if let Some(ref owner) = filter.owner_id {
        q = q.bind(owner.clone());
    }
    if let Some(ref tag) = filter.tag {
        q = q.bind(format!("%\"{tag}\"%"));
    }
    q
}

pub(crate) fn server_from_row(row: &sqlx::sqlite::SqliteRow) -> ServerRecord {
    let core_type: String = row.get("core_type");
    let mode: String = row.get("connection_mode");
    let status: String = row.get("status");
    ServerRecord {
        id: row.get("id"),
        name: row.get("name"),
        core_type: CoreType::parse(&core_type).unwrap_or(CoreType::Java),
        core_name: row.get("core_name"),
        core_version: row.get("core_version"),
        connection_mode: ConnectionMode::parse(&mode).unwrap_or(ConnectionMode::Plugin),
        connection_config: json::decode_or_default(
            row.get::<Option<String>, _>("connection_config").as_deref(),
            "connection_config",
        ),
        status: ServerStatus::parse(&status).unwrap_or(ServerStatus::Offline),
        owner_id: row.get("owner_id"),
        tags: json::decode_or_default(row.get::<Option<String>, _>("tags").as_deref(), "tags"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_seen: row.get("last_seen"),
    }
}
