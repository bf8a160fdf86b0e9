//! Console command execution, single and batch.

use {
    axum::{
        Json,
        extract::{Path, State},
        http::HeaderMap,
    },
    serde::Deserialize,
};

use crate::{
    auth::authenticate,
    envelope::{ApiError, ApiResult, ok},
    state::WebState,
};

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub command: String,
    #[serde(default, rename = "runAs")]
    pub run_as: Option<String>,
}

pub async fn execute(
    State(state): State<WebState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CommandBody>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    let result = state
        .hub
        .commands
        .execute(&id, &body.command, body.run_as.as_deref(), &actor)
        .await?;
    Ok(ok(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct BatchCommandBody {
    #[serde(rename = "serverIds")]
    pub server_ids: Vec<String>,
    pub command: String,
}

/// Run one command across several servers; per-server outcomes are
/// independent.
pub async fn batch(
    State(state): State<WebState>,
    headers: HeaderMap,
    Json(body): Json<BatchCommandBody>,
) -> ApiResult {
    let actor = authenticate(&state, &headers).await?;
    if body.server_ids.is_empty() {
        return Err(ApiError::validation("serverIds must not be empty"));
    }
    if body.server_ids.len() > 50 {
        return Err(ApiError::validation("at most 50 servers per batch"));
    }

    let mut results = Vec::with_capacity(body.server_ids.len());
    for server_id in &body.server_ids {
        let outcome = state
            .hub
            .commands
            .execute(server_id, &body.command, None, &actor)
            .await;
        results.push(match outcome {
            Ok(result) => serde_json::json!({
                "serverId": server_id,
                "success": true,
                "result": result,
            }),
            Err(e) => serde_json::json!({
                "serverId": server_id,
                "success": false,
                "error": { "code": e.kind.code(), "message": e.message },
            }),
        });
    }
    Ok(ok(serde_json::json!({ "results": results })))
}
