//! OpenAPI document for the admin API, served as JSON, YAML, and an
//! interactive page.

use axum::response::{Html, IntoResponse, Response};

use crate::version::SUPPORTED_VERSIONS;

/// Build the OpenAPI 3.1 document.
pub fn document() -> serde_json::Value {
    let bearer_security = serde_json::json!([{ "bearerAuth": [] }]);
    let envelope = |data_desc: &str| {
        serde_json::json!({
            "type": "object",
            "properties": {
                "success": { "type": "boolean" },
                "data": { "type": "object", "description": data_desc },
                "error": { "$ref": "#/components/schemas/Error" },
                "requestId": { "type": "string" },
                "timestamp": { "type": "integer" }
            }
        })
    };

    serde_json::json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Mochi-Link Admin API",
            "description": "Management plane for federated Minecraft servers.",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "servers": SUPPORTED_VERSIONS
            .iter()
            .map(|v| serde_json::json!({ "url": format!("/api/{v}") }))
            .chain(std::iter::once(serde_json::json!({ "url": "/api" })))
            .collect::<Vec<_>>(),
        "components": {
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer" }
            },
            "schemas": {
                "Error": {
                    "type": "object",
                    "properties": {
                        "code": { "type": "string" },
                        "message": { "type": "string" }
                    }
                },
                "Envelope": envelope("operation-specific payload"),
                "Server": {
                    "type": "object",
                    "required": ["id", "name", "core_type", "connection_mode"],
                    "properties": {
                        "id": { "type": "string", "pattern": "^[A-Za-z0-9_-]{1,64}$" },
                        "name": { "type": "string", "maxLength": 255 },
                        "core_type": { "type": "string", "enum": ["Java", "Bedrock"] },
                        "connection_mode": { "type": "string", "enum": ["plugin", "rcon", "terminal"] },
                        "status": { "type": "string", "enum": ["offline", "connecting", "online", "error", "maintenance"] }
                    }
                }
            }
        },
        "paths": {
            "/health": {
                "get": { "summary": "Liveness probe (no auth)", "responses": { "200": { "description": "OK" } } }
            },
            "/servers": {
                "get": { "summary": "List servers", "security": bearer_security,
                         "parameters": page_params(), "responses": std_responses() },
                "post": { "summary": "Register a server", "security": bearer_security,
                          "responses": { "201": { "description": "Created; token returned once" },
                                         "409": { "description": "Duplicate id" } } }
            },
            "/servers/{id}": {
                "get": { "summary": "Fetch a server", "security": bearer_security, "responses": std_responses() },
                "put": { "summary": "Update a server", "security": bearer_security, "responses": std_responses() },
                "delete": { "summary": "Delete a server (cascades)", "security": bearer_security, "responses": std_responses() }
            },
            "/servers/{id}/status": {
                "get": { "summary": "Runtime status", "security": bearer_security, "responses": std_responses() }
            },
            "/servers/{id}/players": {
                "get": { "summary": "Online players", "security": bearer_security, "responses": std_responses() }
            },
            "/servers/{id}/players/{playerId}": {
                "get": { "summary": "Cached player profile", "security": bearer_security, "responses": std_responses() }
            },
            "/servers/{id}/players/{playerId}/kick": {
                "post": { "summary": "Kick a player (202 when deferred)", "security": bearer_security, "responses": std_responses() }
            },
            "/servers/{id}/whitelist": {
                "get": { "summary": "Whitelist (stale flag when offline)", "security": bearer_security, "responses": std_responses() },
                "post": { "summary": "Add to whitelist (202 when deferred)", "security": bearer_security, "responses": std_responses() }
            },
            "/servers/{id}/whitelist/{playerId}": {
                "delete": { "summary": "Remove from whitelist", "security": bearer_security, "responses": std_responses() }
            },
            "/servers/{id}/bans": {
                "get": { "summary": "Ban list", "security": bearer_security, "responses": std_responses() },
                "post": { "summary": "Ban a player", "security": bearer_security, "responses": std_responses() }
            },
            "/servers/{id}/bans/{banId}": {
                "put": { "summary": "Update a ban reason", "security": bearer_security, "responses": std_responses() },
                "delete": { "summary": "Lift a ban", "security": bearer_security, "responses": std_responses() }
            },
            "/servers/{id}/commands": {
                "post": { "summary": "Execute a console command", "security": bearer_security, "responses": std_responses() }
            },
            "/batch/commands": {
                "post": { "summary": "Execute one command on many servers", "security": bearer_security, "responses": std_responses() }
            },
            "/bindings": {
                "get": { "summary": "List group bindings", "security": bearer_security, "responses": std_responses() },
                "post": { "summary": "Create a binding", "security": bearer_security, "responses": std_responses() }
            },
            "/bindings/{id}": {
                "get": { "summary": "Fetch a binding", "security": bearer_security, "responses": std_responses() },
                "put": { "summary": "Update a binding", "security": bearer_security, "responses": std_responses() },
                "delete": { "summary": "Delete a binding", "security": bearer_security, "responses": std_responses() }
            },
            "/audit": {
                "get": { "summary": "Query audit log (serverId required)", "security": bearer_security,
                         "parameters": page_params(), "responses": std_responses() }
            }
        }
    })
}

fn page_params() -> serde_json::Value {
    serde_json::json!([
        { "name": "page", "in": "query", "schema": { "type": "integer", "minimum": 1, "default": 1 } },
        { "name": "limit", "in": "query", "schema": { "type": "integer", "minimum": 1, "maximum": 100, "default": 20 } }
    ])
}

fn std_responses() -> serde_json::Value {
    serde_json::json!({
        "200": { "description": "Wrapped payload", "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Envelope" } } } },
        "401": { "description": "Missing/invalid token" },
        "403": { "description": "ACL denied" },
        "404": { "description": "Unknown resource" }
    })
}

pub async fn serve_json() -> Response {
    axum::Json(document()).into_response()
}

pub async fn serve_yaml() -> Response {
    match serde_yaml::to_string(&document()) {
        Ok(yaml) => (
            [(http::header::CONTENT_TYPE, "application/yaml")],
            yaml,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render OpenAPI YAML");
            http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

pub async fn serve_docs_page() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <title>Mochi-Link API</title>
  <meta name="viewport" content="width=device-width, initial-scale=1">
</head>
<body>
  <redoc spec-url="/api/docs/openapi.json"></redoc>
  <script src="https://cdn.redoc.ly/redoc/latest/bundles/redoc.standalone.js"></script>
</body>
</html>"#,
    )
}
