//! ACL permission checks.
//!
//! Every server-scoped check is `(userId, serverId, "<dotted-op>")` and is
//! denied unless the ACL for that pair grants it, either through the role
//! mapping or the entry's explicit permission allowlist.

use std::sync::Arc;

use {
    mochi_common::{ServiceError, ServiceResult, now_ms},
    mochi_store::{AclRole, SqliteStore},
};

/// Dotted operation names used by the service layer.
pub mod ops {
    pub const SERVER_VIEW: &str = "server.view";
    pub const SERVER_UPDATE: &str = "server.update";
    pub const SERVER_DELETE: &str = "server.delete";
    pub const TOKEN_REGENERATE: &str = "server.token.regenerate";
    pub const ACL_MANAGE: &str = "server.acl.manage";
    pub const WHITELIST_MANAGE: &str = "whitelist.manage";
    pub const BAN_MANAGE: &str = "ban.manage";
    pub const PLAYER_VIEW: &str = "player.view";
    pub const PLAYER_KICK: &str = "player.kick";
    pub const COMMAND_EXECUTE: &str = "command.execute";
    pub const BINDING_MANAGE: &str = "binding.manage";
    pub const AUDIT_VIEW: &str = "audit.view";
}

/// Operations granted to the operator role.
const OPERATOR_OPS: &[&str] = &[
    ops::SERVER_VIEW,
    ops::WHITELIST_MANAGE,
    ops::BAN_MANAGE,
    ops::PLAYER_VIEW,
    ops::PLAYER_KICK,
    ops::COMMAND_EXECUTE,
];

/// Read-only operations granted to the viewer role.
const VIEWER_OPS: &[&str] = &[ops::SERVER_VIEW, ops::PLAYER_VIEW, ops::AUDIT_VIEW];

/// Does `role` allow `operation` by itself?
pub fn role_allows(role: AclRole, operation: &str) -> bool {
    match role {
        AclRole::Owner => true,
        // Admins may not delete the server or run arbitrary console commands.
        AclRole::Admin => {
            operation != ops::SERVER_DELETE && operation != ops::COMMAND_EXECUTE
        },
        AclRole::Operator => OPERATOR_OPS.contains(&operation),
        AclRole::Viewer => VIEWER_OPS.contains(&operation),
    }
}

/// ACL-backed permission checks.
pub struct AclChecker {
    store: Arc<SqliteStore>,
}

impl AclChecker {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Allow/deny for `(user_id, server_id, operation)`.
    pub async fn check(
        &self,
        user_id: &str,
        server_id: &str,
        operation: &str,
    ) -> mochi_store::Result<bool> {
        let Some(entry) = self.store.get_acl(user_id, server_id).await? else {
            return Ok(false);
        };
        if let Some(expires_at) = entry.expires_at
            && now_ms() >= expires_at
        {
            return Ok(false);
        }
        if entry.permissions.iter().any(|p| p == operation) {
            return Ok(true);
        }
        Ok(role_allows(entry.role, operation))
    }

    /// Like [`check`](Self::check), but mapped to the service taxonomy.
    pub async fn require(
        &self,
        user_id: &str,
        server_id: &str,
        operation: &str,
    ) -> ServiceResult<()> {
        let allowed = self
            .check(user_id, server_id, operation)
            .await
            .map_err(|e| ServiceError::internal_logged("acl check", e))?;
        if allowed {
            Ok(())
        } else {
            Err(ServiceError::permission(format!(
                "{user_id} is not allowed to {operation} on {server_id}"
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mochi_store::AclEntry;

    fn entry(role: AclRole, permissions: Vec<String>) -> AclEntry {
        AclEntry {
            user_id: "u1".into(),
            server_id: "s1".into(),
            role,
            permissions,
            granted_by: "system".into(),
            granted_at: 0,
            expires_at: None,
        }
    }

    async fn checker_with(e: AclEntry) -> AclChecker {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        store.upsert_acl(&e).await.unwrap();
        AclChecker::new(store)
    }

    #[test]
    fn role_mapping() {
        assert!(role_allows(AclRole::Owner, ops::SERVER_DELETE));
        assert!(role_allows(AclRole::Owner, ops::COMMAND_EXECUTE));

        assert!(role_allows(AclRole::Admin, ops::WHITELIST_MANAGE));
        assert!(!role_allows(AclRole::Admin, ops::SERVER_DELETE));
        assert!(!role_allows(AclRole::Admin, ops::COMMAND_EXECUTE));

        assert!(role_allows(AclRole::Operator, ops::COMMAND_EXECUTE));
        assert!(role_allows(AclRole::Operator, ops::PLAYER_KICK));
        assert!(!role_allows(AclRole::Operator, ops::BINDING_MANAGE));

        assert!(role_allows(AclRole::Viewer, ops::SERVER_VIEW));
        assert!(!role_allows(AclRole::Viewer, ops::WHITELIST_MANAGE));
    }

    #[tokio::test]
    async fn no_entry_denies() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let checker = AclChecker::new(store);
        assert!(!checker.check("u1", "s1", ops::SERVER_VIEW).await.unwrap());
        assert!(checker.require("u1", "s1", ops::SERVER_VIEW).await.is_err());
    }

    #[tokio::test]
    async fn explicit_allowlist_overrides_role() {
        let checker = checker_with(entry(
            AclRole::Viewer,
            vec![ops::WHITELIST_MANAGE.to_string()],
        ))
        .await;
        assert!(
            checker
                .check("u1", "s1", ops::WHITELIST_MANAGE)
                .await
                .unwrap()
        );
        // Role still applies for everything else.
        assert!(!checker.check("u1", "s1", ops::SERVER_DELETE).await.unwrap());
    }

    #[tokio::test]
    async fn expired_grant_denies() {
        let mut e = entry(AclRole::Owner, vec![]);
        e.expires_at = Some(1); // long past
        let checker = checker_with(e).await;
        assert!(!checker.check("u1", "s1", ops::SERVER_VIEW).await.unwrap());
    }
}
