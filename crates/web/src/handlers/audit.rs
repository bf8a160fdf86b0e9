//! Audit log queries.

use {
    axum::{
        extract::{Query, State},
        http::HeaderMap,
    },
    serde::Deserialize,
};

use {mochi_auth::ops, mochi_store::AuditFilter};

use crate::{
    auth::authenticate,
    envelope::{ApiError, ApiResult, ok},
    state::WebState,
    validate::PageQuery,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "serverId")]
    pub server_id: Option<String>,
    pub operation: Option<String>,
    /// Range bounds in ms since epoch.
    pub from: Option<i64>,
    pub to: Option<i64>,
}

pub async fn list(
    State(state): State<WebState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let page = PageQuery::from_parts(query.page, query.limit).validated()?;

    // Audit access is granted per server.
    let server_id = query
        .server_id
        .clone()
        .ok_or_else(|| ApiError::validation("serverId filter is required"))?;
    state
        .hub
        .acl
        .require(&actor.user_id, &server_id, ops::AUDIT_VIEW)
        .await?;

    let filter = AuditFilter {
        user_id: query.user_id,
        server_id: Some(server_id),
        operation: query.operation,
        from_ms: query.from,
        to_ms: query.to,
    };
    let (records, total) = state
        .hub
        .store()
        .list_audit(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "audit query failed");
            ApiError::new(mochi_common::ErrorKind::Internal, "internal error")
        })?;

    Ok(ok(serde_json::json!({
        "entries": records,
        "total": total,
        "page": page.page,
        "limit": page.limit,
    })))
}
