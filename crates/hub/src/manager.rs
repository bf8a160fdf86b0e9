//! Server lifecycle and the live connection registry.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use {
    tokio::sync::{Mutex, RwLock, oneshot},
    tracing::{info, warn},
};

use {
    mochi_auth::{AclChecker, TokenManager, TokenOptions, ops},
    mochi_common::{ServiceError, ServiceResult, is_valid_server_id, now_ms},
    mochi_protocol::{ConnectorHandshake, Frame, close_codes, system_ops},
    mochi_store::{
        AclEntry, AclRole, ConnectionMode, CoreType, Page, ServerFilter, ServerRecord,
        ServerStatus, ServerUpdate, SqliteStore, StoreError,
    },
};

use crate::{
    audit::{Actor, Auditor},
    connection::ConnectionHandle,
    error::RequestError,
    pending_ops::PendingOpsEngine,
    subscriptions::{HubEvent, SubscriptionRegistry},
};

/// Registration payload (one registration path: `server.register`).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegisterRequest {
    pub id: String,
    pub name: String,
    #[serde(rename = "coreType")]
    pub core_type: CoreType,
    #[serde(rename = "coreName")]
    pub core_name: String,
    #[serde(rename = "coreVersion", default)]
    pub core_version: Option<String>,
    #[serde(rename = "connectionMode")]
    pub connection_mode: ConnectionMode,
    #[serde(rename = "connectionConfig", default)]
    pub connection_config: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Registration result; the raw token is readable only here.
#[derive(Debug, Clone)]
pub struct RegisteredServer {
    pub record: ServerRecord,
    pub token: String,
}

/// Runtime + persisted status for one server.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServerStatusView {
    pub status: ServerStatus,
    #[serde(rename = "lastSeen")]
    pub last_seen: Option<i64>,
    pub capabilities: Vec<String>,
    #[serde(rename = "playerCount", skip_serializing_if = "Option::is_none")]
    pub player_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tps: Option<f64>,
    #[serde(rename = "pendingOperations")]
    pub pending_operations: i64,
    #[serde(rename = "droppedEvents")]
    pub dropped_events: u64,
}

type Waiters = Vec<oneshot::Sender<Result<serde_json::Value, RequestError>>>;

/// Owns the `serverId → ConnectionHandle` map and the permission-checked
/// catalogue operations.
pub struct ServerManager {
    store: Arc<SqliteStore>,
    tokens: Arc<TokenManager>,
    acl: Arc<AclChecker>,
    auditor: Arc<Auditor>,
    engine: Arc<PendingOpsEngine>,
    subscriptions: Arc<SubscriptionRegistry>,
    connections: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
    /// In-flight single-flight requests keyed by `server:op`.
    single_flight: Mutex<HashMap<String, Waiters>>,
}

impl ServerManager {
    pub fn new(
        store: Arc<SqliteStore>,
        tokens: Arc<TokenManager>,
        acl: Arc<AclChecker>,
        auditor: Arc<Auditor>,
        engine: Arc<PendingOpsEngine>,
        subscriptions: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            store,
            tokens,
            acl,
            auditor,
            engine,
            subscriptions,
            connections: RwLock::new(HashMap::new()),
            single_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<PendingOpsEngine> {
        &self.engine
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    // ── Catalogue ────────────────────────────────────────────────────────

    /// Register a server: record + auto-generated token + owner grant.
    pub async fn register(
        &self,
        request: RegisterRequest,
        actor: &Actor,
    ) -> ServiceResult<RegisteredServer> {
        if !is_valid_server_id(&request.id) {
            return Err(ServiceError::validation(
                "server id must match [A-Za-z0-9_-]{1,64}",
            ));
        }
        if request.name.is_empty() || request.name.len() > mochi_common::ids::DISPLAY_NAME_MAX {
            return Err(ServiceError::validation("display name must be 1-255 bytes"));
        }

        let record = ServerRecord {
            id: request.id.clone(),
            name: request.name,
            core_type: request.core_type,
            core_name: request.core_name,
            core_version: request.core_version,
            connection_mode: request.connection_mode,
            connection_config: request.connection_config,
            status: ServerStatus::Offline,
            owner_id: actor.user_id.clone(),
            tags: request.tags,
            created_at: now_ms(),
            updated_at: now_ms(),
            last_seen: None,
        };

        match self.store.create_server(&record).await {
            Ok(()) => {},
            Err(StoreError::Conflict(_)) => {
                self.auditor
                    .failure(
                        actor,
                        Some(&record.id),
                        "server.create",
                        serde_json::json!({ "id": record.id }),
                        "duplicate server id".into(),
                    )
                    .await;
                return Err(ServiceError::conflict(format!(
                    "server {} already exists",
                    record.id
                )));
            },
            Err(e) => return Err(ServiceError::internal_logged("create server", e)),
        }

        let token = self
            .tokens
            .generate(&record.id, TokenOptions::default())
            .await
            .map_err(|e| ServiceError::internal_logged("generate token", e))?;

        self.store
            .upsert_acl(&AclEntry {
                user_id: actor.user_id.clone(),
                server_id: record.id.clone(),
                role: AclRole::Owner,
                permissions: vec![],
                granted_by: actor.user_id.clone(),
                granted_at: now_ms(),
                expires_at: None,
            })
            .await
            .map_err(|e| ServiceError::internal_logged("grant owner role", e))?;

        self.auditor
            .success(
                actor,
                Some(&record.id),
                "server.create",
                serde_json::json!({ "id": record.id, "coreType": record.core_type }),
            )
            .await;
        info!(server_id = %record.id, owner = %actor.user_id, "server registered");

        Ok(RegisteredServer {
            record,
            token: token.token,
        })
    }

    pub async fn get(&self, server_id: &str, actor: &Actor) -> ServiceResult<ServerRecord> {
        self.acl
            .require(&actor.user_id, server_id, ops::SERVER_VIEW)
            .await?;
        self.store
            .get_server(server_id)
            .await
            .map_err(|e| ServiceError::internal_logged("get server", e))?
            .ok_or_else(|| ServiceError::not_found(format!("server {server_id}")))
    }

    /// List servers the actor may view.
    pub async fn list(
        &self,
        filter: &ServerFilter,
        page: Page,
        actor: &Actor,
    ) -> ServiceResult<(Vec<ServerRecord>, i64)> {
        let (records, total) = self
            .store
            .list_servers(filter, page)
            .await
            .map_err(|e| ServiceError::internal_logged("list servers", e))?;

        let mut visible = Vec::with_capacity(records.len());
        for record in records {
            let allowed = self
                .acl
                .check(&actor.user_id, &record.id, ops::SERVER_VIEW)
                .await
                .map_err(|e| ServiceError::internal_logged("acl check", e))?;
            if allowed {
                visible.push(record);
            }
        }
        Ok((visible, total))
    }

    pub async fn update(
        &self,
        server_id: &str,
        update: &ServerUpdate,
        actor: &Actor,
    ) -> ServiceResult<ServerRecord> {
        self.acl
            .require(&actor.user_id, server_id, ops::SERVER_UPDATE)
            .await?;
        let record = match self.store.update_server(server_id, update).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Err(ServiceError::not_found(format!("server {server_id}")));
            },
            Err(e) => return Err(ServiceError::internal_logged("update server", e)),
        };
        self.auditor
            .success(
                actor,
                Some(server_id),
                "server.update",
                serde_json::json!({ "id": server_id }),
            )
            .await;
        Ok(record)
    }

    /// Delete a server; cascades and closes any live connection.
    pub async fn delete(&self, server_id: &str, actor: &Actor) -> ServiceResult<()> {
        self.acl
            .require(&actor.user_id, server_id, ops::SERVER_DELETE)
            .await?;

        if let Some(handle) = self.connections.write().await.remove(server_id) {
            let _ = handle.send_control(&Frame::system(
                system_ops::DISCONNECT,
                serde_json::json!({ "reason": "server deleted" }),
            ));
            handle.close(close_codes::NORMAL, "server deleted");
        }

        match self.store.delete_server(server_id).await {
            Ok(()) => {},
            Err(StoreError::NotFound(_)) => {
                return Err(ServiceError::not_found(format!("server {server_id}")));
            },
            Err(e) => return Err(ServiceError::internal_logged("delete server", e)),
        }

        self.auditor
            .success(
                actor,
                Some(server_id),
                "server.delete",
                serde_json::json!({ "id": server_id }),
            )
            .await;
        info!(server_id, "server deleted");
        Ok(())
    }

    /// Rotate the server's API token; the new secret is returned once.
    pub async fn rotate_token(&self, server_id: &str, actor: &Actor) -> ServiceResult<String> {
        self.acl
            .require(&actor.user_id, server_id, ops::TOKEN_REGENERATE)
            .await?;
        // Ensure the server exists before touching tokens.
        self.store
            .get_server(server_id)
            .await
            .map_err(|e| ServiceError::internal_logged("get server", e))?
            .ok_or_else(|| ServiceError::not_found(format!("server {server_id}")))?;

        let record = self
            .tokens
            .rotate(server_id, &actor.user_id, TokenOptions::default())
            .await
            .map_err(|e| ServiceError::internal_logged("rotate token", e))?;
        Ok(record.token)
    }

    pub async fn status(&self, server_id: &str, actor: &Actor) -> ServiceResult<ServerStatusView> {
        let record = self.get(server_id, actor).await?;
        let handle = self.connection(server_id).await;
        let pending = self.engine.pending_count(server_id).await?;

        let (capabilities, stats, dropped) = match handle {
            Some(ref h) => (h.capabilities(), h.stats(), h.dropped_events()),
            None => (Vec::new(), Default::default(), 0),
        };
        Ok(ServerStatusView {
            status: record.status,
            last_seen: record.last_seen,
            capabilities,
            player_count: stats.player_count,
            tps: stats.tps,
            pending_operations: pending,
            dropped_events: dropped,
        })
    }

    // ── Connections ──────────────────────────────────────────────────────

    pub async fn connection(&self, server_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().await.get(server_id).cloned()
    }

    pub async fn is_online(&self, server_id: &str) -> bool {
        self.connections.read().await.contains_key(server_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Install a handle after a successful handshake.
    ///
    /// Replaces (and closes with `1013`) any previous connection for the
    /// same server, persists the declared core info, transitions the server
    /// online, announces it, and drains the pending-op queue.
    pub async fn bind_connection(
        &self,
        handle: Arc<ConnectionHandle>,
        handshake: &ConnectorHandshake,
    ) -> ServiceResult<()> {
        let server_id = handle.server_id.clone();
        handle.set_capabilities(handshake.capabilities.clone());

        let previous = {
            let mut connections = self.connections.write().await;
            connections.insert(server_id.clone(), Arc::clone(&handle))
        };
        if let Some(old) = previous {
            warn!(server_id = %server_id, old_conn = %old.conn_id, "replacing existing connection");
            old.close(close_codes::REPLACED, "Replaced by new connection");
        }

        self.store
            .update_server(&server_id, &ServerUpdate {
                core_name: Some(handshake.core_name.clone()),
                core_version: Some(handshake.core_version.clone()),
                ..Default::default()
            })
            .await
            .map_err(|e| ServiceError::internal_logged("persist handshake info", e))?;
        self.store
            .set_server_status(&server_id, ServerStatus::Online, Some(now_ms()))
            .await
            .map_err(|e| ServiceError::internal_logged("set status online", e))?;

        self.subscriptions.publish(&HubEvent {
            server_id: server_id.clone(),
            event_type: "server.connected".into(),
            data: serde_json::json!({
                "coreName": handshake.core_name,
                "coreVersion": handshake.core_version,
            }),
            timestamp: now_ms(),
        });
        info!(server_id = %server_id, conn_id = %handle.conn_id, "server online");

        // Drain deferred operations without blocking the reader.
        let engine = Arc::clone(&self.engine);
        let drain_handle = Arc::clone(&handle);
        tokio::spawn(async move {
            if let Err(e) = engine.drain(&drain_handle).await {
                warn!(server_id = %drain_handle.server_id, error = %e, "pending-op drain failed");
            }
        });

        Ok(())
    }

    /// Tear down the handle installed for `conn_id`, if it is still current.
    pub async fn unbind_connection(&self, server_id: &str, conn_id: &str, reason: &str) {
        let removed = {
            let mut connections = self.connections.write().await;
            match connections.get(server_id) {
                Some(current) if current.conn_id == conn_id => connections.remove(server_id),
                _ => None,
            }
        };
        let Some(handle) = removed else {
            return;
        };
        handle.fail_all_pending(RequestError::ConnectionClosed);

        if let Err(e) = self
            .store
            .set_server_status(server_id, ServerStatus::Offline, None)
            .await
        {
            warn!(server_id, error = %e, "failed to persist offline status");
        }
        self.subscriptions.publish(&HubEvent {
            server_id: server_id.to_string(),
            event_type: "server.disconnected".into(),
            data: serde_json::json!({ "reason": reason }),
            timestamp: now_ms(),
        });
        info!(server_id, conn_id, reason, "server offline");
    }

    /// Send a request to the server's live connection.
    pub async fn request(
        &self,
        server_id: &str,
        op: &str,
        data: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, RequestError> {
        let Some(handle) = self.connection(server_id).await else {
            return Err(RequestError::ConnectionClosed);
        };
        handle.request(op, data, timeout).await
    }

    /// Like [`request`](Self::request), but concurrent calls for the same
    /// `(server, op)` coalesce into one in-flight request whose result every
    /// caller observes.
    pub async fn request_single_flight(
        &self,
        server_id: &str,
        op: &str,
        data: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, RequestError> {
        let key = format!("{server_id}:{op}");

        let waiter = {
            let mut inflight = self.single_flight.lock().await;
            match inflight.get_mut(&key) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                },
                None => {
                    inflight.insert(key.clone(), Vec::new());
                    None
                },
            }
        };

        if let Some(rx) = waiter {
            return match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(RequestError::ConnectionClosed),
            };
        }

        let outcome = self.request(server_id, op, data, timeout).await;

        let waiters = self
            .single_flight
            .lock()
            .await
            .remove(&key)
            .unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(outcome.clone());
        }
        outcome
    }

    /// Close every connection for shutdown: notify, close normally, and fail
    /// outstanding requests with `shutting-down`.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<ConnectionHandle>> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            let _ = handle.send_control(&Frame::system(
                system_ops::DISCONNECT,
                serde_json::json!({ "reason": "hub shutting down" }),
            ));
            handle.fail_all_pending(RequestError::ShuttingDown);
            handle.close(close_codes::NORMAL, "hub shutting down");
            if let Err(e) = self
                .store
                .set_server_status(&handle.server_id, ServerStatus::Offline, None)
                .await
            {
                warn!(server_id = %handle.server_id, error = %e, "failed to persist offline status");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn make_manager() -> Arc<ServerManager> {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let tokens = Arc::new(TokenManager::new(Arc::clone(&store), 0));
        let acl = Arc::new(AclChecker::new(Arc::clone(&store)));
        let auditor = Arc::new(Auditor::new(Arc::clone(&store)));
        let engine = Arc::new(PendingOpsEngine::new(
            Arc::clone(&store),
            Arc::clone(&auditor),
        ));
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        Arc::new(ServerManager::new(
            store,
            tokens,
            acl,
            auditor,
            engine,
            subscriptions,
        ))
    }

    pub(crate) fn register_request(id: &str) -> RegisterRequest {
        RegisterRequest {
            id: id.into(),
            name: format!("Server {id}"),
            core_type: CoreType::Java,
            core_name: "paper".into(),
            core_version: Some("1.21".into()),
            connection_mode: ConnectionMode::Plugin,
            connection_config: serde_json::json!({ "host": "127.0.0.1", "port": 25565 }),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn register_grants_owner_and_token() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");

        let registered = manager
            .register(register_request("survival"), &actor)
            .await
            .unwrap();
        assert_eq!(registered.record.id, "survival");
        assert_eq!(registered.token.len(), 64);

        // Owner can do everything, including delete.
        let record = manager.get("survival", &actor).await.unwrap();
        assert_eq!(record.owner_id, "op-1");

        // A stranger cannot even view.
        let stranger = Actor::new("nobody");
        let err = manager.get("survival", &stranger).await.unwrap_err();
        assert_eq!(err.kind, mochi_common::ErrorKind::Permission);

        // An audit row exists for the creation.
        let (rows, _) = manager
            .store()
            .list_audit(
                &mochi_store::AuditFilter {
                    operation: Some("server.create".into()),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].result, mochi_store::AuditResult::Success);
    }

    #[tokio::test]
    async fn register_rejects_bad_ids() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");
        let mut request = register_request("bad id!");
        let err = manager.register(request.clone(), &actor).await.unwrap_err();
        assert_eq!(err.kind, mochi_common::ErrorKind::Validation);

        request.id = "ok".into();
        request.name = String::new();
        let err = manager.register(request, &actor).await.unwrap_err();
        assert_eq!(err.kind, mochi_common::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");
        manager
            .register(register_request("a"), &actor)
            .await
            .unwrap();
        let err = manager
            .register(register_request("a"), &actor)
            .await
            .unwrap_err();
        assert_eq!(err.kind, mochi_common::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn bind_replaces_previous_connection() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");
        manager
            .register(register_request("s1"), &actor)
            .await
            .unwrap();

        let handshake = ConnectorHandshake {
            core_type: "Java".into(),
            core_name: "paper".into(),
            core_version: "1.21".into(),
            capabilities: vec!["whitelist".into()],
        };

        let first = Arc::new(ConnectionHandle::new("s1", None));
        manager
            .bind_connection(Arc::clone(&first), &handshake)
            .await
            .unwrap();
        assert!(manager.is_online("s1").await);

        // A pending request on the first connection.
        let f = Arc::clone(&first);
        let pending = tokio::spawn(async move {
            f.request("player.list", serde_json::Value::Null, Duration::from_secs(30))
                .await
        });
        while first.pending_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = Arc::new(ConnectionHandle::new("s1", None));
        manager
            .bind_connection(Arc::clone(&second), &handshake)
            .await
            .unwrap();

        // Old connection is closing and its pending request failed.
        assert!(first.is_closed());
        assert_eq!(
            pending.await.unwrap().unwrap_err(),
            RequestError::ConnectionClosed
        );

        // Current handle is the second one.
        let current = manager.connection("s1").await.unwrap();
        assert_eq!(current.conn_id, second.conn_id);

        // Server is online with last_seen set.
        let record = manager.get("s1", &actor).await.unwrap();
        assert_eq!(record.status, ServerStatus::Online);
        assert!(record.last_seen.is_some());
    }

    #[tokio::test]
    async fn stale_unbind_does_not_touch_new_connection() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");
        manager
            .register(register_request("s1"), &actor)
            .await
            .unwrap();

        let handshake = ConnectorHandshake {
            core_type: "Java".into(),
            core_name: "paper".into(),
            core_version: "1.21".into(),
            capabilities: vec![],
        };
        let first = Arc::new(ConnectionHandle::new("s1", None));
        manager
            .bind_connection(Arc::clone(&first), &handshake)
            .await
            .unwrap();
        let second = Arc::new(ConnectionHandle::new("s1", None));
        manager
            .bind_connection(Arc::clone(&second), &handshake)
            .await
            .unwrap();

        // The first connection's cleanup runs after replacement; it must
        // not unbind the second connection.
        manager
            .unbind_connection("s1", &first.conn_id, "read loop ended")
            .await;
        assert!(manager.is_online("s1").await);

        manager
            .unbind_connection("s1", &second.conn_id, "closed")
            .await;
        assert!(!manager.is_online("s1").await);
        let record = manager.get("s1", &actor).await.unwrap();
        assert_eq!(record.status, ServerStatus::Offline);
    }

    #[tokio::test]
    async fn single_flight_coalesces() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");
        manager
            .register(register_request("s1"), &actor)
            .await
            .unwrap();
        let handle = Arc::new(ConnectionHandle::new("s1", None));
        manager
            .bind_connection(Arc::clone(&handle), &ConnectorHandshake {
                core_type: "Java".into(),
                core_name: "paper".into(),
                core_version: "1.21".into(),
                capabilities: vec![],
            })
            .await
            .unwrap();

        // Two concurrent single-flight calls; only one request frame is
        // written to the connection.
        let m1 = Arc::clone(&manager);
        let a = tokio::spawn(async move {
            m1.request_single_flight(
                "s1",
                "whitelist.sync",
                serde_json::Value::Null,
                Duration::from_secs(5),
            )
            .await
        });
        let m2 = Arc::clone(&manager);
        let b = tokio::spawn(async move {
            m2.request_single_flight(
                "s1",
                "whitelist.sync",
                serde_json::Value::Null,
                Duration::from_secs(5),
            )
            .await
        });

        // Respond to the one queued request (skip the drain's absence; queue
        // holds exactly the frames sent).
        let mut request_ids = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(1), handle.next_outbound()).await {
                Ok(Some(crate::connection::QueueItem::Frame { text, .. })) => {
                    let frame = mochi_protocol::decode(&text).unwrap();
                    if frame.r#type == mochi_protocol::FrameType::Request
                        && frame.op == "whitelist.sync"
                    {
                        request_ids.push(frame.id);
                        if handle.pending_count() == 1 {
                            break;
                        }
                    }
                },
                _ => break,
            }
        }
        assert_eq!(request_ids.len(), 1, "duplicate calls must coalesce");
        handle.complete(&request_ids[0], Ok(serde_json::json!({ "synced": true })));

        assert_eq!(a.await.unwrap().unwrap()["synced"], true);
        assert_eq!(b.await.unwrap().unwrap()["synced"], true);
    }

    #[tokio::test]
    async fn request_to_offline_server_fails_fast() {
        let manager = make_manager().await;
        let err = manager
            .request("ghost", "player.list", serde_json::Value::Null, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, RequestError::ConnectionClosed);
    }
}
