//! Group↔server binding management.

use {
    axum::{
        Json,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
    },
    serde::Deserialize,
};

use {
    mochi_auth::ops,
    mochi_common::now_ms,
    mochi_store::{BindingRecord, BindingStatus, BindingType, StoreError},
};

use crate::{
    auth::authenticate,
    envelope::{ApiError, ApiResult, ok, with_status},
    state::WebState,
    validate::sanitize_json,
};

#[derive(Debug, Deserialize)]
pub struct CreateBindingBody {
    #[serde(rename = "groupId")]
    pub group_id: String,
    #[serde(rename = "serverId")]
    pub server_id: String,
    #[serde(rename = "bindingType")]
    pub binding_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

pub async fn list(State(state): State<WebState>, headers: HeaderMap) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let bindings = state
        .hub
        .store()
        .list_bindings()
        .await
        .map_err(internal)?;

    // Only bindings on servers the actor can manage are listed.
    let mut visible = Vec::new();
    for binding in bindings {
        let allowed = state
            .hub
            .acl
            .check(&actor.user_id, &binding.server_id, ops::BINDING_MANAGE)
            .await
            .map_err(internal)?;
        if allowed {
            visible.push(binding);
        }
    }
    Ok(ok(serde_json::json!({ "bindings": visible })))
}

pub async fn create(
    State(state): State<WebState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let body = sanitize_json(&body)?;
    let body: CreateBindingBody = serde_json::from_value(body)
        .map_err(|e| ApiError::validation(format!("invalid request body: {e}")))?;

    let binding_type = BindingType::parse(&body.binding_type)
        .ok_or_else(|| ApiError::validation(format!("unknown binding type: {}", body.binding_type)))?;
    if body.group_id.is_empty() {
        return Err(ApiError::validation("groupId must not be empty"));
    }

    state
        .hub
        .acl
        .require(&actor.user_id, &body.server_id, ops::BINDING_MANAGE)
        .await?;
    // The server must exist; bindings weak-reference it.
    state
        .hub
        .store()
        .get_server(&body.server_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(
                mochi_common::ErrorKind::NotFound,
                format!("server {}", body.server_id),
            )
        })?;

    let record = BindingRecord {
        id: uuid::Uuid::new_v4().to_string(),
        group_id: body.group_id,
        server_id: body.server_id,
        binding_type,
        config: body.config,
        created_by: actor.user_id.clone(),
        created_at: now_ms(),
        status: BindingStatus::Active,
        last_used_at: None,
    };
    match state.hub.store().create_binding(&record).await {
        Ok(()) => {},
        Err(StoreError::Conflict(what)) => {
            return Err(ApiError::new(
                mochi_common::ErrorKind::Conflict,
                format!("binding already exists: {what}"),
            ));
        },
        Err(e) => return Err(internal(e)),
    }

    state
        .hub
        .auditor
        .success(
            &actor,
            Some(&record.server_id),
            "binding.create",
            serde_json::json!({
                "bindingId": record.id,
                "groupId": record.group_id,
                "type": record.binding_type,
            }),
        )
        .await;
    Ok(with_status(
        StatusCode::CREATED,
        serde_json::json!({ "binding": record }),
    ))
}

pub async fn get(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let binding = fetch(&state, &id).await?;
    state
        .hub
        .acl
        .require(&actor.user_id, &binding.server_id, ops::BINDING_MANAGE)
        .await?;
    Ok(ok(serde_json::json!({ "binding": binding })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateBindingBody {
    pub config: Option<serde_json::Value>,
    pub status: Option<String>,
}

pub async fn update(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let body = sanitize_json(&body)?;
    let body: UpdateBindingBody = serde_json::from_value(body)
        .map_err(|e| ApiError::validation(format!("invalid request body: {e}")))?;

    let binding = fetch(&state, &id).await?;
    state
        .hub
        .acl
        .require(&actor.user_id, &binding.server_id, ops::BINDING_MANAGE)
        .await?;

    let status = match body.status.as_deref() {
        None => None,
        Some(raw) => Some(
            BindingStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status: {raw}")))?,
        ),
    };
    let updated = state
        .hub
        .store()
        .update_binding(&id, body.config.as_ref(), status)
        .await
        .map_err(internal)?;

    state
        .hub
        .auditor
        .success(
            &actor,
            Some(&updated.server_id),
            "binding.update",
            serde_json::json!({ "bindingId": id }),
        )
        .await;
    Ok(ok(serde_json::json!({ "binding": updated })))
}

pub async fn delete(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let binding = fetch(&state, &id).await?;
    state
        .hub
        .acl
        .require(&actor.user_id, &binding.server_id, ops::BINDING_MANAGE)
        .await?;

    state
        .hub
        .store()
        .delete_binding(&id)
        .await
        .map_err(internal)?;
    state
        .hub
        .auditor
        .success(
            &actor,
            Some(&binding.server_id),
            "binding.delete",
            serde_json::json!({ "bindingId": id }),
        )
        .await;
    Ok(ok(serde_json::json!({ "deleted": id })))
}

async fn fetch(state: &WebState, id: &str) -> Result<BindingRecord, ApiError> {
    state
        .hub
        .store()
        .get_binding(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(mochi_common::ErrorKind::NotFound, format!("binding {id}")))
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "binding store error");
    ApiError::new(mochi_common::ErrorKind::Internal, "internal error")
}
