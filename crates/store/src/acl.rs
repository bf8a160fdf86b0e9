//! Per-(user, server) role and permission allowlist.

use sqlx::Row;

use crate::{
    error::Result,
    json,
    store::SqliteStore,
    types::{AclEntry, AclRole},
};

impl SqliteStore {
    pub async fn get_acl(&self, user_id: &str, server_id: &str) -> Result<Option<AclEntry>> {
        let sql = format!(
            "SELECT * FROM {} WHERE user_id = ? AND server_id = ?",
            self.tables.server_acl
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(server_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(acl_from_row))
    }

    pub async fn list_acl_by_server(&self, server_id: &str) -> Result<Vec<AclEntry>> {
        let sql = format!(
            "SELECT * FROM {} WHERE server_id = ? ORDER BY granted_at",
            self.tables.server_acl
        );
        let rows = sqlx::query(&sql)
            .bind(server_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(acl_from_row).collect())
    }

    pub async fn list_acl_by_user(&self, user_id: &str) -> Result<Vec<AclEntry>> {
        let sql = format!(
            "SELECT * FROM {} WHERE user_id = ? ORDER BY granted_at",
            self.tables.server_acl
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(acl_from_row).collect())
    }

    pub async fn upsert_acl(&self, entry: &AclEntry) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (user_id, server_id, role, permissions, granted_by, granted_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, server_id) DO UPDATE SET
                role = excluded.role,
                permissions = excluded.permissions,
                granted_by = excluded.granted_by,
                granted_at = excluded.granted_at,
                expires_at = excluded.expires_at",
            self.tables.server_acl
        );
        sqlx::query(&sql)
            .bind(&entry.user_id)
            .bind(&entry.server_id)
            .bind(entry.role.as_str())
            .bind(json::encode(&entry.permissions))
            .bind(&entry.granted_by)
            .bind(entry.granted_at)
            .bind(entry.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_acl(&self, user_id: &str, server_id: &str) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = ? AND server_id = ?",
            self.tables.server_acl
        );
        let result = sqlx::query(&sql)
            .bind(user_id)
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn acl_from_row(row: &sqlx::sqlite::SqliteRow) -> AclEntry {
    let role: String = row.get("role");
    AclEntry {
        user_id: row.get("user_id"),
        server_id: row.get("server_id"),
        role: AclRole::parse(&role).unwrap_or(AclRole::Viewer),
        permissions: json::decode_or_default(
            row.get::<Option<String>, _>("permissions").as_deref(),
            "permissions",
        ),
        granted_by: row.get("granted_by"),
        granted_at: row.get("granted_at"),
        expires_at: row.get("expires_at"),
    }
}
