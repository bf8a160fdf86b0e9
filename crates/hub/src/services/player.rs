//! Online-player queries and kicks.

use {
    mochi_auth::ops,
    mochi_common::{ServiceError, ServiceResult, sanitize_player_target},
};

use crate::{
    audit::Actor,
    error::RequestError,
    services::{MutationOutcome, ServiceDeps},
};

/// Online player listing; `stale` is set when the server is offline and the
/// list is necessarily empty.
#[derive(Debug, Clone)]
pub struct OnlinePlayers {
    pub players: Vec<serde_json::Value>,
    pub stale: bool,
}

pub struct PlayerService {
    deps: ServiceDeps,
}

impl PlayerService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Players currently online. Offline servers report an empty stale list.
    pub async fn list_online(&self, server_id: &str, actor: &Actor) -> ServiceResult<OnlinePlayers> {
        self.deps
            .acl
            .require(&actor.user_id, server_id, ops::PLAYER_VIEW)
            .await?;

        if !self.deps.manager.is_online(server_id).await {
            return Ok(OnlinePlayers {
                players: Vec::new(),
                stale: true,
            });
        }

        let data = self
            .deps
            .manager
            .request(
                server_id,
                "player.list",
                serde_json::Value::Null,
                self.deps.request_timeout(),
            )
            .await
            .map_err(|e| e.to_service_error())?;

        let players = data
            .get("players")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(OnlinePlayers {
            players,
            stale: false,
        })
    }

    /// Cached profile for one player, from any identifier.
    pub async fn lookup(
        &self,
        server_id: &str,
        identifier: &str,
        actor: &Actor,
    ) -> ServiceResult<mochi_store::PlayerCacheEntry> {
        self.deps
            .acl
            .require(&actor.user_id, server_id, ops::PLAYER_VIEW)
            .await?;
        self.deps
            .manager
            .store()
            .find_player(identifier)
            .await
            .map_err(|e| ServiceError::internal_logged("player lookup", e))?
            .ok_or_else(|| ServiceError::not_found(format!("player {identifier}")))
    }

    /// Kick a player; deferred when the server is offline.
    pub async fn kick(
        &self,
        server_id: &str,
        player: &str,
        reason: Option<&str>,
        actor: &Actor,
    ) -> ServiceResult<MutationOutcome> {
        self.deps
            .acl
            .require(&actor.user_id, server_id, ops::PLAYER_KICK)
            .await?;
        let player = sanitize_player_target(player)
            .ok_or_else(|| ServiceError::validation("player name is empty"))?;

        let params = match reason {
            Some(r) => serde_json::json!({ "reason": r }),
            None => serde_json::json!({}),
        };
        let audit_data = serde_json::json!({ "player": player, "reason": reason });

        if !self.deps.manager.is_online(server_id).await {
            self.deps
                .engine
                .enqueue(server_id, "player.kick", &player, params)
                .await?;
            self.deps
                .auditor
                .success(
                    actor,
                    Some(server_id),
                    "player.kick",
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
            .request(server_id, "player.kick", data, self.deps.request_timeout())
            .await
        {
            Ok(_) => {
                self.deps
                    .auditor
                    .success(actor, Some(server_id), "player.kick", audit_data)
                    .await;
                Ok(MutationOutcome::Applied)
            },
            Err(RequestError::ConnectionClosed) => {
                self.deps
                    .engine
                    .enqueue(server_id, "player.kick", &player, serde_json::json!({}))
                    .await?;
                Ok(MutationOutcome::Deferred)
            },
            Err(e) => {
                self.deps
                    .auditor
                    .failure(actor, Some(server_id), "player.kick", audit_data, e.to_string())
                    .await;
                Err(e.to_service_error())
            },
        }
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
    async fn offline_list_is_empty_and_stale() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");
        manager
            .register(register_request("s1"), &actor)
            .await
            .unwrap();

        let service = PlayerService::new(deps_for(&manager));
        let listing = service.list_online("s1", &actor).await.unwrap();
        assert!(listing.stale);
        assert!(listing.players.is_empty());
    }

    #[tokio::test]
    async fn offline_kick_defers() {
        let manager = make_manager().await;
        let actor = Actor::new("op-1");
        manager
            .register(register_request("s1"), &actor)
            .await
            .unwrap();

        let service = PlayerService::new(deps_for(&manager));
        let outcome = service
            .kick("s1", "Griefer", Some("bye"), &actor)
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::Deferred);

        let pending = manager.store().list_pending("s1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation_type, "player.kick");
        assert_eq!(pending[0].parameters["reason"], "bye");
    }
}
