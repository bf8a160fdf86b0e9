//! Endpoint handlers for the admin API.

pub mod audit;
pub mod bindings;
pub mod commands;
pub mod players;
pub mod roster;
pub mod servers;

use axum::extract::State;

use crate::{envelope::ok, state::WebState};

/// Liveness probe; the only unauthenticated endpoint.
pub async fn health(State(state): State<WebState>) -> axum::response::Response {
    let connections = state.hub.manager().connection_count().await;
    ok(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": connections,
    }))
}
