//! Online players and kicks.

use {
    axum::{
        Json,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
    },
    serde::Deserialize,
};

use mochi_hub::MutationOutcome;

use crate::{
    auth::authenticate,
    envelope::{ApiResult, ok, with_status},
    state::WebState,
    validate::sanitize_string,
};

pub async fn list(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let listing = state.hub.players.list_online(&id, &actor).await?;
    Ok(ok(serde_json::json!({
        "players": listing.players,
        "stale": listing.stale,
    })))
}

pub async fn get(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path((id, player_id)): Path<(String, String)>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let entry = state.hub.players.lookup(&id, &player_id, &actor).await?;
    Ok(ok(serde_json::json!({ "player": entry })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct KickBody {
    pub reason: Option<String>,
}

pub async fn kick(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path((id, player_id)): Path<(String, String)>,
    body: Option<Json<KickBody>>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let reason = body
        .and_then(|Json(b)| b.reason)
        .map(|r| sanitize_string(&r));

    let outcome = state
        .hub
        .players
        .kick(&id, &player_id, reason.as_deref(), &actor)
        .await?;
    Ok(mutation_response(outcome))
}

pub(crate) fn mutation_response(outcome: MutationOutcome) -> axum::response::Response {
    match outcome {
        MutationOutcome::Applied => ok(serde_json::json!({ "status": "applied" })),
        MutationOutcome::Deferred => with_status(
            StatusCode::ACCEPTED,
            serde_json::json!({ "status": "deferred" }),
        ),
    }
}
