//! Connector-facing WebSocket listener.

use std::{future::Future, net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{ConnectInfo, Query, State, WebSocketUpgrade},
        http::HeaderMap,
        response::IntoResponse,
        routing::get,
    },
    serde::Deserialize,
    tracing::info,
};

use crate::{
    state::HubState,
    ws::{WsCredentials, handle_connection},
};

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    #[serde(rename = "serverId")]
    server_id: Option<String>,
    token: Option<String>,
}

/// Router exposing `/ws` for connector traffic.
pub fn ws_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .with_state(state)
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<HubState>>,
) -> impl IntoResponse {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let creds = WsCredentials {
        server_id: query.server_id.or_else(|| header_value("x-server-id")),
        token: query.token.or_else(|| header_value("x-auth-token")),
    };
    ws.on_upgrade(move |socket| handle_connection(socket, state, creds, remote_addr))
}

/// Bind and serve until `shutdown` resolves, then close every connection.
pub async fn run_ws_server(
    state: Arc<HubState>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = ws_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "ws: listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    state.begin_shutdown().await;
    Ok(())
}
