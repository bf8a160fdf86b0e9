//! Group↔server binding persistence.

use sqlx::Row;

use mochi_common::now_ms;

use crate::{
    error::{Result, StoreError},
    json,
    store::SqliteStore,
    types::{BindingRecord, BindingStatus, BindingType},
};

impl SqliteStore {
    pub async fn create_binding(&self, record: &BindingRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, group_id, server_id, binding_type, config, created_by,
                created_at, status, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.tables.server_bindings
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.group_id)
            .bind(&record.server_id)
            .bind(record.binding_type.as_str())
            .bind(json::encode(&record.config))
            .bind(&record.created_by)
            .bind(record.created_at)
            .bind(record.status.as_str())
            .bind(record.last_used_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StoreError::classify(
                    e,
                    &format!(
                        "binding ({}, {}, {})",
                        record.group_id,
                        record.server_id,
                        record.binding_type.as_str()
                    ),
                )
            })?;
        Ok(())
    }

    pub async fn get_binding(&self, id: &str) -> Result<Option<BindingRecord>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.tables.server_bindings);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(binding_from_row))
    }

    pub async fn list_bindings(&self) -> Result<Vec<BindingRecord>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY created_at",
            self.tables.server_bindings
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(binding_from_row).collect())
    }

    pub async fn list_bindings_by_group(&self, group_id: &str) -> Result<Vec<BindingRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE group_id = ? ORDER BY created_at",
            self.tables.server_bindings
        );
        let rows = sqlx::query(&sql)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(binding_from_row).collect())
    }

    pub async fn list_bindings_by_server(&self, server_id: &str) -> Result<Vec<BindingRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE server_id = ? ORDER BY created_at",
            self.tables.server_bindings
        );
        let rows = sqlx::query(&sql)
            .bind(server_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(binding_from_row).collect())
    }

    pub async fn find_binding(
        &self,
        group_id: &str,
        server_id: &str,
        binding_type: BindingType,
    ) -> Result<Option<BindingRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE group_id = ? AND server_id = ? AND binding_type = ?",
            self.tables.server_bindings
        );
        let row = sqlx::query(&sql)
            .bind(group_id)
            .bind(server_id)
            .bind(binding_type.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(binding_from_row))
    }

    pub async fn update_binding(
        &self,
        id: &str,
        config: Option<&serde_json::Value>,
        status: Option<BindingStatus>,
    ) -> Result<BindingRecord> {
        let sql = format!(
            "UPDATE {} SET config = COALESCE(?, config), status = COALESCE(?, status) WHERE id = ?",
            self.tables.server_bindings
        );
        let result = sqlx::query(&sql)
            .bind(config.map(json::encode))
            .bind(status.map(|s| s.as_str()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("binding {id}")));
        }
        self.get_binding(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("binding {id}")))
    }

    pub async fn delete_binding(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.tables.server_bindings);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_binding(&self, id: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET last_used_at = ? WHERE id = ?",
            self.tables.server_bindings
        );
        sqlx::query(&sql)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn binding_from_row(row: &sqlx::sqlite::SqliteRow) -> BindingRecord {
    let binding_type: String = row.get("binding_type");
    let status: String = row.get("status");
    BindingRecord {
        id: row.get("id"),
        group_id: row.get("group_id"),
        server_id: row.get("server_id"),
        binding_type: BindingType::parse(&binding_type).unwrap_or(BindingType::Chat),
        config: json::decode_or_default(
            row.get::<Option<String>, _>("config").as_deref(),
            "config",
        ),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        status: BindingStatus::parse(&status).unwrap_or(BindingStatus::Inactive),
        last_used_at: row.get("last_used_at"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use crate::{
        error::StoreError,
        store::tests::make_store,
        types::{BindingRecord, BindingStatus, BindingType},
    };

    pub(crate) fn binding(id: &str, group: &str, server: &str, kind: BindingType) -> BindingRecord {
        BindingRecord {
            id: id.into(),
            group_id: group.into(),
            server_id: server.into(),
            binding_type: kind,
            config: serde_json::json!({ "enabled": true }),
            created_by: "op-1".into(),
            created_at: 1000,
            status: BindingStatus::Active,
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn unique_per_type_per_pair() {
        let store = make_store().await;
        store
            .create_binding(&binding("b1", "g1", "s1", BindingType::Chat))
            .await
            .unwrap();
        // Same pair, same type: conflict.
        let err = store
            .create_binding(&binding("b2", "g1", "s1", BindingType::Chat))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        // Same pair, different type: fine.
        store
            .create_binding(&binding("b3", "g1", "s1", BindingType::Event))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lookups() {
        let store = make_store().await;
        store
            .create_binding(&binding("b1", "g1", "s1", BindingType::Chat))
            .await
            .unwrap();
        store
            .create_binding(&binding("b2", "g1", "s2", BindingType::Chat))
            .await
            .unwrap();
        store
            .create_binding(&binding("b3", "g2", "s1", BindingType::Event))
            .await
            .unwrap();

        assert_eq!(store.list_bindings_by_group("g1").await.unwrap().len(), 2);
        assert_eq!(store.list_bindings_by_server("s1").await.unwrap().len(), 2);
        assert!(
            store
                .find_binding("g2", "s1", BindingType::Event)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_binding("g2", "s1", BindingType::Chat)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn update_and_touch() {
        let store = make_store().await;
        store
            .create_binding(&binding("b1", "g1", "s1", BindingType::Chat))
            .await
            .unwrap();

        let updated = store
            .update_binding("b1", None, Some(BindingStatus::Inactive))
            .await
            .unwrap();
        assert_eq!(updated.status, BindingStatus::Inactive);
        assert_eq!(updated.config["enabled"], true);

        store.touch_binding("b1").await.unwrap();
        let got = store.get_binding("b1").await.unwrap().unwrap();
        assert!(got.last_used_at.is_some());
    }
}
