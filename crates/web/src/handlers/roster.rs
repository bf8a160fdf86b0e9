//! Whitelist and ban endpoints.

use {
    axum::{
        Json,
        extract::{Path, State},
        http::HeaderMap,
    },
    serde::Deserialize,
};

use mochi_hub::ListKind;

use crate::{
    auth::authenticate,
    envelope::{ApiError, ApiResult, ok},
    handlers::players::mutation_response,
    state::WebState,
    validate::sanitize_string,
};

#[derive(Debug, Deserialize)]
pub struct RosterBody {
    pub player: String,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn list_kind(state: WebState, headers: HeaderMap, id: String, kind: ListKind) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let view = state.hub.roster.list(kind, &id, &actor).await?;
    Ok(ok(serde_json::json!({
        "players": view.players,
        "stale": view.stale,
    })))
}

pub async fn whitelist_list(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    list_kind(state, headers, id, ListKind::Whitelist).await
}

pub async fn whitelist_add(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RosterBody>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let player = sanitize_string(&body.player);
    let outcome = state
        .hub
        .roster
        .add(ListKind::Whitelist, &id, &player, &actor)
        .await?;
    Ok(mutation_response(outcome))
}

pub async fn whitelist_remove(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path((id, player_id)): Path<(String, String)>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let outcome = state
        .hub
        .roster
        .remove(ListKind::Whitelist, &id, &player_id, &actor)
        .await?;
    Ok(mutation_response(outcome))
}

pub async fn bans_list(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    list_kind(state, headers, id, ListKind::Ban).await
}

pub async fn bans_add(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RosterBody>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let player = sanitize_string(&body.player);
    let reason = body.reason.map(|r| sanitize_string(&r));
    let outcome = state
        .hub
        .roster
        .ban_with_reason(&id, &player, reason.as_deref(), &actor)
        .await?;
    Ok(mutation_response(outcome))
}

/// Update a ban (re-issue with a new reason).
pub async fn bans_update(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path((id, ban_id)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let reason = body
        .get("reason")
        .and_then(|v| v.as_str())
        .map(sanitize_string);
    if reason.is_none() {
        return Err(ApiError::validation("reason is required"));
    }
    let outcome = state
        .hub
        .roster
        .ban_with_reason(&id, &ban_id, reason.as_deref(), &actor)
        .await?;
    Ok(mutation_response(outcome))
}

pub async fn bans_remove(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path((id, ban_id)): Path<(String, String)>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let outcome = state
        .hub
        .roster
        .remove(ListKind::Ban, &id, &ban_id, &actor)
        .await?;
    Ok(mutation_response(outcome))
}
