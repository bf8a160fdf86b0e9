//! Audit recording helper shared by the service layer.

use std::sync::Arc;

use tracing::error;

use mochi_store::{AuditResult, NewAudit, SqliteStore};

/// Context attached to audit rows for one operator action.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ip_address: None,
            user_agent: None,
        }
    }
}

/// Writes audit rows; audit failures are logged, never propagated, so an
/// audit problem cannot fail the operation it describes.
pub struct Auditor {
    store: Arc<SqliteStore>,
}

impl Auditor {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        actor: &Actor,
        server_id: Option<&str>,
        operation: &str,
        data: serde_json::Value,
        result: AuditResult,
        error_message: Option<String>,
    ) {
        let entry = NewAudit {
            user_id: Some(actor.user_id.clone()),
            server_id: server_id.map(str::to_string),
            operation: operation.to_string(),
            operation_data: data,
            result: Some(result),
            error_message,
            ip_address: actor.ip_address.clone(),
            user_agent: actor.user_agent.clone(),
        };
        if let Err(e) = self.store.append_audit(&entry).await {
            error!(operation, error = %e, "failed to append audit record");
        }
    }

    pub async fn success(
        &self,
        actor: &Actor,
        server_id: Option<&str>,
        operation: &str,
        data: serde_json::Value,
    ) {
        self.record(actor, server_id, operation, data, AuditResult::Success, None)
            .await;
    }

    pub async fn failure(
        &self,
        actor: &Actor,
        server_id: Option<&str>,
        operation: &str,
        data: serde_json::Value,
        message: String,
    ) {
        self.record(
            actor,
            server_id,
            operation,
            data,
            AuditResult::Failure,
            Some(message),
        )
        .await;
    }

    /// Internal error path: `result = error`.
    pub async fn internal(
        &self,
        actor: &Actor,
        server_id: Option<&str>,
        operation: &str,
        data: serde_json::Value,
        message: String,
    ) {
        self.record(
            actor,
            server_id,
            operation,
            data,
            AuditResult::Error,
            Some(message),
        )
        .await;
    }
}
