//! Versioned HTTP admin API over the hub services.

pub mod auth;
pub mod envelope;
pub mod handlers;
pub mod openapi;
pub mod state;
pub mod validate;
pub mod version;

pub use state::{ApiRateLimit, WebState};

use std::{future::Future, net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{DefaultBodyLimit, Request},
        middleware::{self, Next},
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    tower_http::{cors::CorsLayer, trace::TraceLayer},
    tracing::info,
};

use mochi_hub::Hub;

use crate::envelope::ApiError;

/// Request bodies above this size are rejected.
const MAX_BODY_BYTES: usize = 1_048_576; // 1 MiB

/// Build the full admin API router.
pub fn api_router(hub: Arc<Hub>, cors: bool, rate_limit: Option<ApiRateLimit>) -> Router {
    let state = WebState::new(hub, rate_limit);

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/servers",
            get(handlers::servers::list).post(handlers::servers::create),
        )
        .route(
            "/servers/{id}",
            get(handlers::servers::get)
                .put(handlers::servers::update)
                .delete(handlers::servers::delete),
        )
        .route("/servers/{id}/status", get(handlers::servers::status))
        .route("/servers/{id}/players", get(handlers::players::list))
        .route(
            "/servers/{id}/players/{playerId}",
            get(handlers::players::get),
        )
        .route(
            "/servers/{id}/players/{playerId}/kick",
            post(handlers::players::kick),
        )
        .route(
            "/servers/{id}/whitelist",
            get(handlers::roster::whitelist_list).post(handlers::roster::whitelist_add),
        )
        .route(
            "/servers/{id}/whitelist/{playerId}",
            axum::routing::delete(handlers::roster::whitelist_remove),
        )
        .route(
            "/servers/{id}/bans",
            get(handlers::roster::bans_list).post(handlers::roster::bans_add),
        )
        .route(
            "/servers/{id}/bans/{banId}",
            axum::routing::put(handlers::roster::bans_update)
                .delete(handlers::roster::bans_remove),
        )
        .route("/servers/{id}/commands", post(handlers::commands::execute))
        .route("/batch/commands", post(handlers::commands::batch))
        .route(
            "/bindings",
            get(handlers::bindings::list).post(handlers::bindings::create),
        )
        .route(
            "/bindings/{id}",
            get(handlers::bindings::get)
                .put(handlers::bindings::update)
                .delete(handlers::bindings::delete),
        )
        .route("/audit", get(handlers::audit::list))
        .route("/docs", get(openapi::serve_docs_page))
        .route("/docs/openapi.json", get(openapi::serve_json))
        .route("/docs/openapi.yaml", get(openapi::serve_yaml))
        .with_state(state);

    let mut app = Router::new()
        .nest("/api/v1", api.clone())
        .nest("/api", api)
        .layer(middleware::from_fn(request_guard))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    if cors {
        app = app.layer(CorsLayer::permissive());
    }
    app.layer(TraceLayer::new_for_http())
}

/// Reject traversal paths and negotiate the API version before routing.
async fn request_guard(request: Request, next: Next) -> Response {
    let uri = request.uri().clone();
    if uri.path().contains("..") {
        return ApiError::validation("path traversal is not allowed").into_response();
    }
    if let Err(e) = version::negotiate(&uri, request.headers()) {
        return e.into_response();
    }
    next.run(request).await
}

/// Serve the admin API until `shutdown` resolves.
pub async fn run_http_server(
    hub: Arc<Hub>,
    addr: SocketAddr,
    cors: bool,
    rate_limit: Option<ApiRateLimit>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = api_router(hub, cors, rate_limit);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http: admin API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
