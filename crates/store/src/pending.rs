//! Offline-operation queue rows.

use sqlx::Row;

use mochi_common::now_ms;

use crate::{
    error::{Result, StoreError},
    json,
    store::SqliteStore,
    types::{PendingOpRecord, PendingOpStatus},
};

impl SqliteStore {
    pub async fn enqueue_pending(&self, record: &PendingOpRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, server_id, operation_type, target, parameters, status,
                created_at, scheduled_at, executed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.tables.pending_operations
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.server_id)
            .bind(&record.operation_type)
            .bind(&record.target)
            .bind(json::encode(&record.parameters))
            .bind(record.status.as_str())
            .bind(record.created_at)
            .bind(record.scheduled_at)
            .bind(record.executed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pending operations for a server, oldest first. The rowid breaks
    /// same-millisecond ties so drain order is always enqueue order.
    pub async fn list_pending(&self, server_id: &str) -> Result<Vec<PendingOpRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE server_id = ? AND status = 'pending' ORDER BY created_at, rowid",
            self.tables.pending_operations
        );
        let rows = sqlx::query(&sql)
            .bind(server_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(pending_from_row).collect())
    }

    pub async fn mark_pending_status(&self, id: &str, status: PendingOpStatus) -> Result<()> {
        let executed = matches!(status, PendingOpStatus::Done | PendingOpStatus::Failed)
            .then(now_ms);
        let sql = format!(
            "UPDATE {} SET status = ?, executed_at = COALESCE(?, executed_at) WHERE id = ?",
            self.tables.pending_operations
        );
        let result = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(executed)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("pending operation {id}")));
        }
        Ok(())
    }

    /// Number of still-pending operations for a server.
    pub async fn count_pending(&self, server_id: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {} WHERE server_id = ? AND status = 'pending'",
            self.tables.pending_operations
        );
        let row = sqlx::query(&sql)
            .bind(server_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

fn pending_from_row(row: &sqlx::sqlite::SqliteRow) -> PendingOpRecord {
    let status: String = row.get("status");
    PendingOpRecord {
        id: row.get("id"),
        server_id: row.get("server_id"),
        operation_type: row.get("operation_type"),
        target: row.get("target"),
        parameters: json::decode_or_default(
            row.get::<Option<String>, _>("parameters").as_deref(),
            "parameters",
        ),
        status: PendingOpStatus::parse(&status).unwrap_or(PendingOpStatus::Pending),
        created_at: row.get("created_at"),
        scheduled_at: row.get("scheduled_at"),
        executed_at: row.get("executed_at"),
    }
}
