//! API token persistence.

use sqlx::Row;

use crate::{
    error::Result,
    json,
    store::SqliteStore,
    types::ApiTokenRecord,
};

impl SqliteStore {
    pub async fn create_token(&self, record: &ApiTokenRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, server_id, token, token_hash, ip_whitelist, encryption_config,
                created_at, expires_at, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.tables.api_tokens
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.server_id)
            .bind(&record.token)
            .bind(&record.token_hash)
            .bind(json::encode(&record.ip_whitelist))
            .bind(record.encryption_config.as_ref().map(json::encode))
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(record.last_used_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_tokens(&self, server_id: &str) -> Result<Vec<ApiTokenRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE server_id = ? ORDER BY created_at",
            self.tables.api_tokens
        );
        let rows = sqlx::query(&sql)
            .bind(server_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(token_from_row).collect())
    }

    pub async fn delete_token(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.tables.api_tokens);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_tokens_for_server(&self, server_id: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE server_id = ?", self.tables.api_tokens);
        let result = sqlx::query(&sql)
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Equality lookup on (serverId, token).
    pub async fn find_token(&self, server_id: &str, token: &str) -> Result<Option<ApiTokenRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE server_id = ? AND token = ?",
            self.tables.api_tokens
        );
        let row = sqlx::query(&sql)
            .bind(server_id)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(token_from_row))
    }

    /// Secondary lookup by SHA-256 hash.
    pub async fn find_token_by_hash(&self, token_hash: &str) -> Result<Option<ApiTokenRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE token_hash = ?",
            self.tables.api_tokens
        );
        let row = sqlx::query(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(token_from_row))
    }

    pub async fn touch_token(&self, id: &str, used_at: i64) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET last_used_at = ? WHERE id = ?",
            self.tables.api_tokens
        );
        sqlx::query(&sql)
            .bind(used_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn token_from_row(row: &sqlx::sqlite::SqliteRow) -> ApiTokenRecord {
    ApiTokenRecord {
        id: row.get("id"),
        server_id: row.get("server_id"),
        token: row.get("token"),
        token_hash: row.get("token_hash"),
        ip_whitelist: json::decode_or_default(
            row.get::<Option<String>, _>("ip_whitelist").as_deref(),
            "ip_whitelist",
        ),
        encryption_config: json::decode_optional(
            row.get::<Option<String>, _>("encryption_config").as_deref(),
            "encryption_config",
        ),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        last_used_at: row.get("last_used_at"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::{store::tests::make_store, types::ApiTokenRecord};

    fn make_token(id: &str, server_id: &str, token: &str) -> ApiTokenRecord {
        ApiTokenRecord {
            id: id.into(),
            server_id: server_id.into(),
            token: token.into(),
            token_hash: format!("hash-{token}"),
            ip_whitelist: vec![],
            encryption_config: None,
            created_at: 1000,
            expires_at: None,
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn pair_and_hash_lookup() {
        let store = make_store().await;
        store
            .create_token(&make_token("t1", "survival", "aaaa"))
            .await
            .unwrap();

        let by_pair = store.find_token("survival", "aaaa").await.unwrap();
        assert!(by_pair.is_some());
        assert!(store.find_token("survival", "bbbb").await.unwrap().is_none());
        assert!(store.find_token("lobby", "aaaa").await.unwrap().is_none());

        let by_hash = store.find_token_by_hash("hash-aaaa").await.unwrap();
        assert_eq!(by_hash.unwrap().id, "t1");
    }

    #[tokio::test]
    async fn delete_all_for_server() {
        let store = make_store().await;
        store
            .create_token(&make_token("t1", "s", "a"))
            .await
            .unwrap();
        store
            .create_token(&make_token("t2", "s", "b"))
            .await
            .unwrap();
        store
            .create_token(&make_token("t3", "other", "c"))
            .await
            .unwrap();

        assert_eq!(store.delete_tokens_for_server("s").await.unwrap(), 2);
        assert_eq!(store.list_tokens("s").await.unwrap().len(), 0);
        assert_eq!(store.list_tokens("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn touch_updates_last_used() {
        let store = make_store().await;
        store
            .create_token(&make_token("t1", "s", "a"))
            .await
            .unwrap();
        store.touch_token("t1", 5555).await.unwrap();
        let tokens = store.list_tokens("s").await.unwrap();
        assert_eq!(tokens[0].last_used_at, Some(5555));
    }
}
