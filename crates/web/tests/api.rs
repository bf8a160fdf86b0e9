//! Admin API behavior through the real router.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use {
    axum::body::Body,
    http::{Request, StatusCode},
    tower::ServiceExt,
};

use {
    mochi_auth::{AclChecker, TokenManager},
    mochi_hub::{
        Actor, Auditor, ConnectionChatSink, Hub, HubState, PendingOpsEngine, RegisterRequest,
        ServerManager, SubscriptionRegistry,
    },
    mochi_routing::{GroupDelivery, GroupSink, MessageRouter},
    mochi_store::{ConnectionMode, CoreType, SqliteStore},
};

struct NullGroupSink;

#[async_trait::async_trait]
impl GroupSink for NullGroupSink {
    async fn deliver(&self, _msg: GroupDelivery) {}
}

/// Hub with one pre-registered server owned by `op-1`; returns its token.
async fn test_app() -> (axum::Router, Arc<Hub>, String) {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let tokens = Arc::new(TokenManager::new(Arc::clone(&store), 0));
    let acl = Arc::new(AclChecker::new(Arc::clone(&store)));
    let auditor = Arc::new(Auditor::new(Arc::clone(&store)));
    let engine = Arc::new(PendingOpsEngine::new(
        Arc::clone(&store),
        Arc::clone(&auditor),
    ));
    let subscriptions = Arc::new(SubscriptionRegistry::new());
    let manager = Arc::new(ServerManager::new(
        Arc::clone(&store),
        Arc::clone(&tokens),
        Arc::clone(&acl),
        Arc::clone(&auditor),
        engine,
        subscriptions,
    ));
    let router = Arc::new(MessageRouter::new(
        Arc::clone(&store),
        Arc::new(ConnectionChatSink::new(Arc::clone(&manager))),
        Arc::new(NullGroupSink),
    ));
    let state = HubState::new(Arc::clone(&manager), tokens, router, 16, 60);
    let hub = Hub::new(state, acl, auditor);

    let registered = manager
        .register(
            RegisterRequest {
                id: "lobby".into(),
                name: "Lobby".into(),
                core_type: CoreType::Java,
                core_name: "paper".into(),
                core_version: None,
                connection_mode: ConnectionMode::Plugin,
                connection_config: serde_json::json!({}),
                tags: vec![],
            },
            &Actor::new("op-1"),
        )
        .await
        .unwrap();

    let app = mochi_web::api_router(Arc::clone(&hub), false, None);
    (app, hub, registered.token)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_needs_no_auth() {
    let (app, _hub, _token) = test_app().await;
    let response = app.oneshot(get("/api/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "ok");
    assert!(json["requestId"].is_string());
}

#[tokio::test]
async fn missing_token_is_401() {
    let (app, _hub, _token) = test_app().await;
    let response = app.oneshot(get("/api/servers", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn register_server_returns_token_once() {
    let (app, hub, token) = test_app().await;

    let response = app
        .oneshot(post_json("/api/servers", &token, serde_json::json!({
            "id": "survival",
            "name": "生存服",
            "coreType": "Java",
            "coreName": "paper",
            "connectionMode": "plugin",
            "connectionConfig": { "host": "127.0.0.1", "port": 25565 }
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["id"], "survival");
    assert_eq!(json["data"]["name"], "生存服");
    let fresh = json["data"]["token"].as_str().unwrap();
    assert_eq!(fresh.len(), 64);

    // Persisted rows: server, token, owner ACL, audit.
    let store = hub.store();
    let record = store.get_server("survival").await.unwrap().unwrap();
    assert_eq!(record.owner_id, "op-1");
    assert_eq!(store.list_tokens("survival").await.unwrap().len(), 1);
    let acl = store.get_acl("op-1", "survival").await.unwrap().unwrap();
    assert_eq!(acl.role, mochi_store::AclRole::Owner);
    let (audit, _) = store
        .list_audit(
            &mochi_store::AuditFilter {
                operation: Some("server.create".into()),
                server_id: Some("survival".into()),
                ..Default::default()
            },
            mochi_store::Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].result, mochi_store::AuditResult::Success);
}

#[tokio::test]
async fn duplicate_server_id_is_409() {
    let (app, _hub, token) = test_app().await;
    let body = serde_json::json!({
        "id": "lobby",
        "name": "Lobby again",
        "coreType": "Java",
        "coreName": "paper",
        "connectionMode": "plugin"
    });
    let response = app
        .oneshot(post_json("/api/servers", &token, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn invalid_server_id_is_400() {
    let (app, _hub, token) = test_app().await;
    let body = serde_json::json!({
        "id": "bad id!",
        "name": "x",
        "coreType": "Java",
        "coreName": "paper",
        "connectionMode": "plugin"
    });
    let response = app
        .oneshot(post_json("/api/servers", &token, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn offline_whitelist_add_returns_202() {
    let (app, hub, token) = test_app().await;
    let response = app
        .oneshot(post_json(
            "/api/servers/lobby/whitelist",
            &token,
            serde_json::json!({ "player": "Alice" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "deferred");
    assert_eq!(hub.store().count_pending("lobby").await.unwrap(), 1);
}

#[tokio::test]
async fn unsupported_version_is_rejected() {
    let (app, _hub, token) = test_app().await;
    let response = app
        .oneshot(get("/api/servers?version=42", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "VERSION_NOT_SUPPORTED");
    assert_eq!(json["error"]["details"]["supported"][0], "v1");
}

#[tokio::test]
async fn v1_path_is_equivalent() {
    let (app, _hub, _token) = test_app().await;
    let response = app.oneshot(get("/api/v1/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn foreign_server_is_403() {
    let (app, hub, _token) = test_app().await;

    // A second operator with their own server and token.
    let other = hub
        .manager()
        .register(
            RegisterRequest {
                id: "other".into(),
                name: "Other".into(),
                core_type: CoreType::Bedrock,
                core_name: "nukkit".into(),
                core_version: None,
                connection_mode: ConnectionMode::Plugin,
                connection_config: serde_json::json!({}),
                tags: vec![],
            },
            &Actor::new("op-2"),
        )
        .await
        .unwrap();

    // op-2's token cannot read op-1's server.
    let response = app
        .oneshot(get("/api/servers/lobby", Some(&other.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (app, _hub, _token) = test_app().await;
    let response = app
        .oneshot(get("/api/docs/openapi.json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["openapi"], "3.1.0");
    assert!(json["paths"]["/servers"].is_object());
}

#[tokio::test]
async fn per_token_rate_limit_is_429() {
    let (_, hub, token) = test_app().await;
    let app = mochi_web::api_router(
        Arc::clone(&hub),
        false,
        Some(mochi_web::ApiRateLimit {
            window_ms: 60_000,
            max_requests: 2,
        }),
    );

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get("/api/servers/lobby", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app
        .oneshot(get("/api/servers/lobby", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn proto_keys_are_rejected() {
    let (app, _hub, token) = test_app().await;
    let body = serde_json::json!({
        "id": "evil",
        "name": "x",
        "coreType": "Java",
        "coreName": "paper",
        "connectionMode": "plugin",
        "connectionConfig": { "__proto__": { "polluted": true } }
    });
    let response = app
        .oneshot(post_json("/api/servers", &token, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
