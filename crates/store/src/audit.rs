//! Append-only audit log with time-based retention.

use sqlx::Row;

use mochi_common::now_ms;

use crate::{
    error::Result,
    json,
    store::SqliteStore,
    types::{AuditFilter, AuditRecord, AuditResult, NewAudit, Page},
};

impl SqliteStore {
    /// Append one audit row; returns the assigned monotonic id.
    pub async fn append_audit(&self, entry: &NewAudit) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {} (user_id, server_id, operation, operation_data, result,
                error_message, ip_address, user_agent, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.tables.audit_logs
        );
        let result = sqlx::query(&sql)
            .bind(&entry.user_id)
            .bind(&entry.server_id)
            .bind(&entry.operation)
            .bind(json::encode(&entry.operation_data))
            .bind(entry.result.unwrap_or(AuditResult::Success).as_str())
            .bind(&entry.error_message)
            .bind(&entry.ip_address)
            .bind(&entry.user_agent)
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_audit(
        &self,
        filter: &AuditFilter,
        page: Page,
    ) -> Result<(Vec<AuditRecord>, i64)> {
        let page = page.clamped();
        let mut clauses = Vec::new();
        if filter.user_id.is_some() {
            clauses.push("user_id = ?");
        }
        if filter.server_id.is_some() {
            clauses.push("server_id = ?");
        }
        if filter.operation.is_some() {
            clauses.push("operation = ?");
        }
        if filter.from_ms.is_some() {
            clauses.push("timestamp >= ?");
        }
        if filter.to_ms.is_some() {
            clauses.push("timestamp <= ?");
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let count_sql = format!(
            "SELECT COUNT(*) AS n FROM {}{where_sql}",
            self.tables.audit_logs
        );
        let list_sql = format!(
            "SELECT * FROM {}{where_sql} ORDER BY id DESC LIMIT ? OFFSET ?",
            self.tables.audit_logs
        );

        let total: i64 = bind_audit_filters(sqlx::query(&count_sql), filter)
            .fetch_one(&self.pool)
            .await?
            .get("n");

        let rows = bind_audit_filters(sqlx::query(&list_sql), filter)
            .bind(i64::from(page.limit))
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.iter().map(audit_from_row).collect(), total))
    }

    /// Delete audit rows older than the cutoff; returns how many were purged.
    pub async fn purge_audit_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE timestamp < ?", self.tables.audit_logs);
        let result = sqlx::query(&sql)
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_audit_filters<'q>(mut q: SqliteQuery<'q>, filter: &AuditFilter) -> SqliteQuery<'q> {
    if let Some(ref user) = filter.user_id {
        q = q.bind(user.clone());
    }
    if let Some(ref server) = filter.server_id {
        q = q.bind(server.clone());
    }
    if let Some(ref op) = filter.operation {
        q = q.bind(op.clone());
    }
    if let Some(from) = filter.from_ms {
        q = q.bind(from);
    }
    if let Some(to) = filter.to_ms {
        q = q.bind(to);
    }
    q
}

fn audit_from_row(row: &sqlx::sqlite::SqliteRow) -> AuditRecord {
    let result: String = row.get("result");
    AuditRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        server_id: row.get("server_id"),
        operation: row.get("operation"),
        operation_data: json::decode_or_default(
            row.get::<Option<String>, _>("operation_data").as_deref(),
            "operation_data",
        ),
        result: AuditResult::parse(&result).unwrap_or(AuditResult::Error),
        error_message: row.get("error_message"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        timestamp: row.get("timestamp"),
    }
}
