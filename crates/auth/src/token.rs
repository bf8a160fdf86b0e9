//! Connector token generation, validation, and rotation.

use std::{net::IpAddr, sync::Arc};

use {
    rand::RngCore,
    sha2::{Digest, Sha256},
    tracing::warn,
};

use {
    mochi_common::now_ms,
    mochi_store::{ApiTokenRecord, AuditResult, NewAudit, SqliteStore},
};

use crate::ip::ip_allowed;

/// Token length on the wire: 32 random bytes, hex-encoded.
pub const TOKEN_HEX_LEN: usize = 64;

/// Options for token generation.
#[derive(Debug, Clone, Default)]
pub struct TokenOptions {
    /// Lifetime in seconds; `None` or 0 means never expires.
    pub expires_in: Option<u64>,
    /// Plain IPs or CIDR blocks; empty means any.
    pub ip_whitelist: Vec<String>,
    pub encryption_config: Option<serde_json::Value>,
}

/// Outcome of validating a presented token.
#[derive(Debug)]
pub enum TokenValidation {
    Valid(ApiTokenRecord),
    NotFound,
    Expired,
    IpDenied,
}

impl TokenValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Token lifecycle over the store.
pub struct TokenManager {
    store: Arc<SqliteStore>,
    /// Default lifetime applied when generation options carry none
    /// (`security.tokenExpiry`; 0 = never).
    default_expiry_secs: u64,
}

impl TokenManager {
    pub fn new(store: Arc<SqliteStore>, default_expiry_secs: u64) -> Self {
        Self {
            store,
            default_expiry_secs,
        }
    }

    /// Generate and persist a token for a server. The raw secret is only
    /// readable from the returned record.
    pub async fn generate(
        &self,
        server_id: &str,
        options: TokenOptions,
    ) -> mochi_store::Result<ApiTokenRecord> {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let token = hex_encode(&bytes);
        let token_hash = sha256_hex(&token);

        let expiry_secs = options.expires_in.unwrap_or(self.default_expiry_secs);
        let expires_at = (expiry_secs > 0).then(|| now_ms() + (expiry_secs as i64) * 1000);

        let record = ApiTokenRecord {
            id: uuid::Uuid::new_v4().to_string(),
            server_id: server_id.to_string(),
            token,
            token_hash,
            ip_whitelist: options.ip_whitelist,
            encryption_config: options.encryption_config,
            created_at: now_ms(),
            expires_at,
            last_used_at: None,
        };
        self.store.create_token(&record).await?;
        Ok(record)
    }

    /// Validate a token presented for `server_id` from `remote_addr`.
    ///
    /// Updates `last_used` on success.
    pub async fn validate(
        &self,
        server_id: &str,
        presented: &str,
        remote_addr: Option<IpAddr>,
    ) -> mochi_store::Result<TokenValidation> {
        let candidates = self.store.list_tokens(server_id).await?;
        let Some(record) = candidates
            .into_iter()
            .find(|t| constant_time_eq(t.token.as_bytes(), presented.as_bytes()))
        else {
            return Ok(TokenValidation::NotFound);
        };

        if let Some(expires_at) = record.expires_at
            && now_ms() >= expires_at
        {
            return Ok(TokenValidation::Expired);
        }

        if !record.ip_whitelist.is_empty() {
            let Some(addr) = remote_addr else {
                return Ok(TokenValidation::IpDenied);
            };
            if !ip_allowed(addr, &record.ip_whitelist) {
                warn!(server_id, %addr, "token presented from non-whitelisted address");
                return Ok(TokenValidation::IpDenied);
            }
        }

        self.store.touch_token(&record.id, now_ms()).await?;
        Ok(TokenValidation::Valid(record))
    }

    /// Delete all tokens for a server and issue a fresh one.
    ///
    /// Existing sockets are not closed here; they fail at their next
    /// validation.
    pub async fn rotate(
        &self,
        server_id: &str,
        actor: &str,
        options: TokenOptions,
    ) -> mochi_store::Result<ApiTokenRecord> {
        self.store.delete_tokens_for_server(server_id).await?;
        let record = self.generate(server_id, options).await?;
        self.store
            .append_audit(&NewAudit {
                user_id: Some(actor.to_string()),
                server_id: Some(server_id.to_string()),
                operation: "server.token.regenerate".into(),
                operation_data: serde_json::json!({ "tokenId": record.id }),
                result: Some(AuditResult::Success),
                ..Default::default()
            })
            .await?;
        Ok(record)
    }
}

/// Byte-wise comparison without early exit.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn manager() -> TokenManager {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        TokenManager::new(store, 0)
    }

    #[tokio::test]
    async fn generates_64_hex() {
        let mgr = manager().await;
        let record = mgr.generate("s1", TokenOptions::default()).await.unwrap();
        assert_eq!(record.token.len(), TOKEN_HEX_LEN);
        assert!(record.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(record.token_hash, sha256_hex(&record.token));
        assert!(record.expires_at.is_none());
    }

    #[tokio::test]
    async fn validates_and_touches() {
        let mgr = manager().await;
        let record = mgr.generate("s1", TokenOptions::default()).await.unwrap();

        let outcome = mgr.validate("s1", &record.token, None).await.unwrap();
        assert!(outcome.is_valid());

        let outcome = mgr.validate("s1", "0".repeat(64).as_str(), None).await.unwrap();
        assert!(matches!(outcome, TokenValidation::NotFound));

        // Wrong server id.
        let outcome = mgr.validate("s2", &record.token, None).await.unwrap();
        assert!(matches!(outcome, TokenValidation::NotFound));
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mgr = TokenManager::new(Arc::clone(&store), 0);

        let record = ApiTokenRecord {
            id: "t1".into(),
            server_id: "s1".into(),
            token: "a".repeat(TOKEN_HEX_LEN),
            token_hash: sha256_hex(&"a".repeat(TOKEN_HEX_LEN)),
            ip_whitelist: vec![],
            encryption_config: None,
            created_at: 0,
            expires_at: Some(now_ms() - 1),
            last_used_at: None,
        };
        store.create_token(&record).await.unwrap();

        let outcome = mgr.validate("s1", &record.token, None).await.unwrap();
        assert!(matches!(outcome, TokenValidation::Expired));
    }

    #[tokio::test]
    async fn ip_whitelist_enforced() {
        let mgr = manager().await;
        let record = mgr
            .generate("s1", TokenOptions {
                ip_whitelist: vec!["10.0.0.0/8".into(), "192.168.1.5".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        let ok = mgr
            .validate("s1", &record.token, Some("10.1.2.3".parse().unwrap()))
            .await
            .unwrap();
        assert!(ok.is_valid());

        let ok = mgr
            .validate("s1", &record.token, Some("192.168.1.5".parse().unwrap()))
            .await
            .unwrap();
        assert!(ok.is_valid());

        let denied = mgr
            .validate("s1", &record.token, Some("8.8.8.8".parse().unwrap()))
            .await
            .unwrap();
        assert!(matches!(denied, TokenValidation::IpDenied));

        // Whitelisted token with no known peer address is denied.
        let denied = mgr.validate("s1", &record.token, None).await.unwrap();
        assert!(matches!(denied, TokenValidation::IpDenied));
    }

    #[tokio::test]
    async fn rotation_invalidates_previous() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mgr = TokenManager::new(Arc::clone(&store), 0);

        let old = mgr.generate("s1", TokenOptions::default()).await.unwrap();
        let new = mgr
            .rotate("s1", "op-1", TokenOptions::default())
            .await
            .unwrap();

        assert!(matches!(
            mgr.validate("s1", &old.token, None).await.unwrap(),
            TokenValidation::NotFound
        ));
        assert!(mgr.validate("s1", &new.token, None).await.unwrap().is_valid());
        assert_eq!(store.list_tokens("s1").await.unwrap().len(), 1);
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
