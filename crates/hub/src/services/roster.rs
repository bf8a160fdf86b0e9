//! Whitelist and ban management.
//!
//! Both are server-side rosters with identical hub semantics: add/remove
//! mutations that apply immediately when the server is online and defer to
//! the pending-op queue when it is not.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use {
    mochi_auth::ops,
    mochi_common::{ServiceError, ServiceResult, now_ms, sanitize_player_target},
    mochi_store::{IdentityMarkers, PlayerCacheEntry},
};

use crate::{audit::Actor, error::RequestError, services::ServiceDeps};

/// Which roster a call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Whitelist,
    Ban,
}

impl ListKind {
    fn op(self, verb: &str) -> String {
        match self {
            Self::Whitelist => format!("whitelist.{verb}"),
            Self::Ban => format!("ban.{verb}"),
        }
    }

    fn permission(self) -> &'static str {
        match self {
            Self::Whitelist => ops::WHITELIST_MANAGE,
            Self::Ban => ops::BAN_MANAGE,
        }
    }
}

/// How a mutation was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Sent to the live connection and acknowledged.
    Applied,
    /// Queued for execution at the next reconnect.
    Deferred,
}

/// Roster listing with a staleness marker for offline reads.
#[derive(Debug, Clone)]
pub struct RosterView {
    pub players: Vec<String>,
    pub stale: bool,
}

/// Whitelist/ban operations.
pub struct RosterService {
    deps: ServiceDeps,
    /// Last-known roster per (server, kind); served with `stale: true` when
    /// the server is offline. Runtime-only, rebuilt from live queries.
    cache: Mutex<HashMap<(String, &'static str), Vec<String>>>,
}

impl RosterService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self {
            deps,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Add a player to the roster. Idempotent at the protocol level.
    pub async fn add(
        &self,
        kind: ListKind,
        server_id: &str,
        player: &str,
        actor: &Actor,
    ) -> ServiceResult<MutationOutcome> {
        self.mutate(kind, "add", server_id, player, serde_json::json!({}), actor)
            .await
    }

    /// Remove a player from the roster.
    pub async fn remove(
        &self,
        kind: ListKind,
        server_id: &str,
        player: &str,
        actor: &Actor,
    ) -> ServiceResult<MutationOutcome> {
        self.mutate(kind, "remove", server_id, player, serde_json::json!({}), actor)
            .await
    }

    /// Ban with a reason (reason travels in the request parameters).
    pub async fn ban_with_reason(
        &self,
        server_id: &str,
        player: &str,
        reason: Option<&str>,
        actor: &Actor,
    ) -> ServiceResult<MutationOutcome> {
        let params = match reason {
            Some(r) => serde_json::json!({ "reason": r }),
            None => serde_json::json!({}),
        };
        self.mutate(ListKind::Ban, "add", server_id, player, params, actor)
            .await
    }

    /// Current roster. Online servers are queried live; offline servers get
    /// the last-known list flagged stale.
    pub async fn list(
        &self,
        kind: ListKind,
        server_id: &str,
        actor: &Actor,
    ) -> ServiceResult<RosterView> {
        self.deps
            .acl
            .require(&actor.user_id, server_id, ops::SERVER_VIEW)
            .await?;
        self.ensure_server(server_id).await?;

        let cache_key = (server_id.to_string(), kind_key(kind));
        if !self.deps.manager.is_online(server_id).await {
            let players = self
                .cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&cache_key)
                .cloned()
                .unwrap_or_default();
            return Ok(RosterView {
                players,
                stale: true,
            });
        }

        let data = self
            .deps
            .manager
            .request_single_flight(
                server_id,
                &kind.op("list"),
                serde_json::Value::Null,
                self.deps.request_timeout(),
            )
            .await
            .map_err(|e| e.to_service_error())?;

        let players: Vec<String> = data
            .get("players")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key, players.clone());
        Ok(RosterView {
            players,
            stale: false,
        })
    }

    async fn mutate(
        &self,
        kind: ListKind,
        verb: &str,
        server_id: &str,
        player: &str,
        params: serde_json::Value,
        actor: &Actor,
    ) -> ServiceResult<MutationOutcome> {
        self.deps
            .acl
            .require(&actor.user_id, server_id, kind.permission())
            .await?;
        self.ensure_server(server_id).await?;

        let player = sanitize_player_target(player)
            .ok_or_else(|| ServiceError::validation("player name is empty"))?;
        let op = kind.op(verb);
        let audit_data = serde_json::json!({ "player": player });

        if !self.deps.manager.is_online(server_id).await {
            self.deps
                .engine
                .enqueue(server_id, &op, &player, params)
                .await?;
            self.deps
                .auditor
                .success(
                    actor,
                    Some(server_id),
                    &op,
                    serde_json::json!({ "player": player, "deferred": true }),
                )
                .await;
            return Ok(MutationOutcome::Deferred);
        }

        let mut data = params;
        if let Some(map) = data.as_object_mut() {
            map.insert("player".into(), serde_json::Value::String(player.clone()));
        }

        match self
            .deps
            .manager
            .request(server_id, &op, data, self.deps.request_timeout())
            .await
        {
            Ok(_) => {
                self.apply_to_cache(kind, server_id, verb, &player);
                self.remember_player(server_id, &player).await;
                self.deps
                    .auditor
                    .success(actor, Some(server_id), &op, audit_data)
                    .await;
                Ok(MutationOutcome::Applied)
            },
            // The connection died mid-flight; the mutation still qualifies
            // for deferred execution.
            Err(RequestError::ConnectionClosed) => {
                self.deps
                    .engine
                    .enqueue(server_id, &op, &player, serde_json::json!({}))
                    .await?;
                self.deps
                    .auditor
                    .success(
                        actor,
                        Some(server_id),
                        &op,
                        serde_json::json!({ "player": player, "deferred": true }),
                    )
                    .await;
                Ok(MutationOutcome::Deferred)
            },
            Err(e) => {
                self.deps
                    .auditor
                    .failure(actor, Some(server_id), &op, audit_data, e.to_string())
                    .await;
                Err(e.to_service_error())
            },
        }
    }

    fn apply_to_cache(&self, kind: ListKind, server_id: &str, verb: &str, player: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let entry = cache
            .entry((server_id.to_string(), kind_key(kind)))
            .or_default();
        match verb {
            "add" if !entry.iter().any(|p| p == player) => entry.push(player.to_string()),
            "remove" => entry.retain(|p| p != player),
            _ => {},
        }
    }

    async fn remember_player(&self, server_id: &str, player: &str) {
        let entry = PlayerCacheEntry {
            uuid: None,
            xuid: None,
            name: player.to_string(),
            display_name: None,
            last_server_id: server_id.to_string(),
            last_seen: now_ms(),
            identity_confidence: 1.0,
            identity_markers: IdentityMarkers::default(),
            is_premium: None,
            device_type: None,
            identity_conflict: false,
        };
        if let Err(e) = self.deps.manager.store().upsert_player(&entry).await {
            tracing::warn!(player, error = %e, "failed to update player cache");
        }
    }

    async fn ensure_server(&self, server_id: &str) -> ServiceResult<()> {
        self.deps
            .manager
            .store()
            .get_server(server_id)
            .await
            .map_err(|e| ServiceError::internal_logged("get server", e))?
            .ok_or_else(|| ServiceError::not_found(format!("server {server_id}")))?;
        Ok(())
    }
}

fn kind_key(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Whitelist => "whitelist",
        ListKind::Ban => "ban",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::manager::tests::{make_manager, register_request};

    fn deps_for(manager: &Arc<crate::manager::ServerManager>) -> ServiceDeps {
        ServiceDeps {
            manager: Arc::clone(manager),
            acl: Arc::new(mochi_auth::AclChecker::new(Arc::clone(manager.store()))),
            auditor: Arc::new(crate::audit::Auditor::new(Arc::clone(manager.store()))),
            engine: Arc::clone(manager.engine()),
        }
    }

    #[tokio::test]
    async fn offline_mutations_enqueue_in_order() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");
        manager
            .register(register_request("survival"), &actor)
            .await
            .unwrap();

        let service = RosterService::new(deps_for(&manager));

        // Scenario: add Alice, remove Bob, add Alice while offline.
        for (verb, player) in [("add", "Alice"), ("remove", "Bob"), ("add", "Alice")] {
            let outcome = match verb {
                "add" => service
                    .add(ListKind::Whitelist, "survival", player, &actor)
                    .await
                    .unwrap(),
                _ => service
                    .remove(ListKind::Whitelist, "survival", player, &actor)
                    .await
                    .unwrap(),
            };
            assert_eq!(outcome, MutationOutcome::Deferred);
        }

        let pending = manager.store().list_pending("survival").await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].target, "Alice");
        assert_eq!(pending[0].operation_type, "whitelist.add");
        assert_eq!(pending[1].target, "Bob");
        assert_eq!(pending[2].target, "Alice");
    }

    #[tokio::test]
    async fn empty_target_is_rejected_not_enqueued() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");
        manager
            .register(register_request("s1"), &actor)
            .await
            .unwrap();

        let service = RosterService::new(deps_for(&manager));
        let err = service
            .add(ListKind::Whitelist, "s1", "   ", &actor)
            .await
            .unwrap_err();
        assert_eq!(err.kind, mochi_common::ErrorKind::Validation);
        assert_eq!(manager.store().count_pending("s1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn permission_denied_for_viewer() {
        let manager = make_manager().await;
        let owner = Actor::new("op-1");
        manager
            .register(register_request("s1"), &owner)
            .await
            .unwrap();
        manager
            .store()
            .upsert_acl(&mochi_store::AclEntry {
                user_id: "viewer".into(),
                server_id: "s1".into(),
                role: mochi_store::AclRole::Viewer,
                permissions: vec![],
                granted_by: "op-1".into(),
                granted_at: 0,
                expires_at: None,
            })
            .await
            .unwrap();

        let service = RosterService::new(deps_for(&manager));
        let viewer = Actor::new("viewer");
        let err = service
            .add(ListKind::Whitelist, "s1", "Alice", &viewer)
            .await
            .unwrap_err();
        assert_eq!(err.kind, mochi_common::ErrorKind::Permission);

        // But viewing the (stale, empty) roster is allowed.
        let view = service
            .list(ListKind::Whitelist, "s1", &viewer)
            .await
            .unwrap();
        assert!(view.stale);
        assert!(view.players.is_empty());
    }

    #[tokio::test]
    async fn unknown_server_is_not_found() {
        let manager = make_manager().await;
        let service = RosterService::new(deps_for(&manager));
        let actor = Actor::new("op-1");
        let err = service
            .add(ListKind::Whitelist, "ghost", "Alice", &actor)
            .await
            .unwrap_err();
        // No grant exists for an unregistered server, so the permission
        // check fires first.
        assert_eq!(err.kind, mochi_common::ErrorKind::Permission);
    }
}
