//! Server catalogue endpoints.

use {
    axum::{
        Json,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
    },
    serde::Deserialize,
};

use {
    mochi_hub::RegisterRequest,
    mochi_store::{ServerFilter, ServerStatus, ServerUpdate},
};

use crate::{
    auth::authenticate,
    envelope::{ApiError, ApiResult, ok, with_status},
    state::WebState,
    validate::{PageQuery, sanitize_json},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub owner: Option<String>,
    pub tag: Option<String>,
}

pub async fn list(
    State(state): State<WebState>,
    headers: HeaderMap,
    Query(query): Query<ServerListQuery>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let page = PageQuery::from_parts(query.page, query.limit).validated()?;

    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            ServerStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status: {raw}")))?,
        ),
    };
    let filter = ServerFilter {
        status,
        owner_id: query.owner,
        tag: query.tag,
    };

    let (servers, total) = state.hub.manager().list(&filter, page, &actor).await?;
    Ok(ok(serde_json::json!({
        "servers": servers,
        "total": total,
        "page": page.page,
        "limit": page.limit,
    })))
}

pub async fn create(
    State(state): State<WebState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let body = sanitize_json(&body)?;
    let request: RegisterRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::validation(format!("invalid request body: {e}")))?;

    let registered = state.hub.manager().register(request, &actor).await?;
    let mut data = serde_json::to_value(&registered.record)
        .map_err(|e| ApiError::new(mochi_common::ErrorKind::Internal, e.to_string()))?;
    if let Some(map) = data.as_object_mut() {
        // The raw token is readable exactly once, here.
        map.insert(
            "token".into(),
            serde_json::Value::String(registered.token),
        );
    }
    Ok(with_status(StatusCode::CREATED, data))
}

pub async fn get(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let record = state.hub.manager().get(&id, &actor).await?;
    Ok(ok(serde_json::json!({ "server": record })))
}

pub async fn update(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let body = sanitize_json(&body)?;
    let update: ServerUpdate = serde_json::from_value(body)
        .map_err(|e| ApiError::validation(format!("invalid request body: {e}")))?;

    let record = state.hub.manager().update(&id, &update, &actor).await?;
    Ok(ok(serde_json::json!({ "server": record })))
}

pub async fn delete(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    state.hub.manager().delete(&id, &actor).await?;
    Ok(ok(serde_json::json!({ "deleted": id })))
}

pub async fn status(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let view = state.hub.manager().status(&id, &actor).await?;
    Ok(ok(serde_json::to_value(view).unwrap_or_default()))
}
