//! Operator command surface: dotted commands dispatched onto the hub
//! services, with the group's chat binding supplying the default server.

use std::sync::Arc;

use {
    mochi_common::{ServiceError, ServiceResult, now_ms},
    mochi_hub::{Actor, Hub, ListKind, MutationOutcome, RegisterRequest},
    mochi_routing::{GroupMessage, MessageRouter},
    mochi_store::{BindingStatus, BindingType, ConnectionMode, CoreType, Page, ServerFilter},
};

use crate::parse::{ParsedCommand, parse};

/// Who is talking, and from which group.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub user_id: String,
    pub user_name: String,
    pub group_id: Option<String>,
}

impl CommandContext {
    fn actor(&self) -> Actor {
        Actor::new(self.user_id.clone())
    }
}

/// The bot-facing command dispatcher.
pub struct BotSurface {
    hub: Arc<Hub>,
    router: Arc<MessageRouter>,
}

impl BotSurface {
    pub fn new(hub: Arc<Hub>, router: Arc<MessageRouter>) -> Self {
        Self { hub, router }
    }

    /// Handle one line of group input.
    ///
    /// `mochi.*` commands return a reply; everything else is relayed as
    /// group chat through the bindings and returns `None`.
    pub async fn handle(&self, ctx: &CommandContext, input: &str) -> Option<String> {
        match parse(input) {
            Some(command) => Some(self.dispatch(ctx, command).await),
            None => {
                self.relay_chat(ctx, input).await;
                None
            },
        }
    }

    /// Feed non-command group chat into the chat bindings.
    async fn relay_chat(&self, ctx: &CommandContext, content: &str) {
        let Some(ref group_id) = ctx.group_id else {
            return;
        };
        let msg = GroupMessage {
            group_id: group_id.clone(),
            user_id: ctx.user_id.clone(),
            user_name: ctx.user_name.clone(),
            content: content.to_string(),
            timestamp: now_ms(),
        };
        if let Err(e) = self.router.handle_group_message(&msg).await {
            tracing::warn!(error = %e, "group chat relay failed");
        }
    }

    async fn dispatch(&self, ctx: &CommandContext, command: ParsedCommand) -> String {
        let result = match command.name.as_str() {
            "help" => Ok(help_text()),
            "server.register" => self.server_register(ctx, &command).await,
            "server.list" => self.server_list(ctx).await,
            "server.info" => self.server_info(ctx, &command).await,
            "server.status" => self.server_status(ctx, &command).await,
            "server.remove" => self.server_remove(ctx, &command).await,
            "token" => self.token(ctx, &command).await,
            "whitelist.add" => self.roster_mutate(ctx, &command, ListKind::Whitelist, true).await,
            "whitelist.remove" => {
                self.roster_mutate(ctx, &command, ListKind::Whitelist, false).await
            },
            "whitelist.list" => self.roster_list(ctx, &command, ListKind::Whitelist).await,
            "ban.add" => self.ban_add(ctx, &command).await,
            "ban.remove" => self.roster_mutate(ctx, &command, ListKind::Ban, false).await,
            "ban.list" => self.roster_list(ctx, &command, ListKind::Ban).await,
            "player.list" => self.player_list(ctx, &command).await,
            "player.kick" => self.player_kick(ctx, &command).await,
            "command.execute" => self.command_execute(ctx, &command).await,
            other => Err(ServiceError::validation(format!(
                "unknown command: mochi.{other} (try mochi.help)"
            ))),
        };
        match result {
            Ok(reply) => reply,
            Err(e) => format!("Error: {}", e.message),
        }
    }

    // ── Server resolution ────────────────────────────────────────────────

    /// The group's default server: the first active chat binding.
    async fn default_server(&self, ctx: &CommandContext) -> ServiceResult<String> {
        let Some(ref group_id) = ctx.group_id else {
            return Err(ServiceError::validation(
                "no server given and no group context",
            ));
        };
        let bindings = self
            .hub
            .store()
            .list_bindings_by_group(group_id)
            .await
            .map_err(|e| ServiceError::internal_logged("list group bindings", e))?;
        bindings
            .into_iter()
            .find(|b| {
                b.status == BindingStatus::Active
                    && matches!(b.binding_type, BindingType::Chat | BindingType::Full)
            })
            .map(|b| b.server_id)
            .ok_or_else(|| {
                ServiceError::validation("no server given and this group has no chat binding")
            })
    }

    /// `[server] <fixed...>`: when more args than `fixed` are present the
    /// first one names the server, otherwise the group default applies.
    async fn server_and_args<'a>(
        &self,
        ctx: &CommandContext,
        command: &'a ParsedCommand,
        fixed: usize,
    ) -> ServiceResult<(String, Vec<&'a str>)> {
        if command.args.len() > fixed {
            let (head, rest) = command.args.split_first().ok_or_else(|| {
                ServiceError::validation("missing arguments")
            })?;
            Ok((head.clone(), rest.iter().map(String::as_str).collect()))
        } else {
            let server = self.default_server(ctx).await?;
            Ok((server, command.args.iter().map(String::as_str).collect()))
        }
    }

    // ── Handlers ─────────────────────────────────────────────────────────

    async fn server_register(
        &self,
        ctx: &CommandContext,
        command: &ParsedCommand,
    ) -> ServiceResult<String> {
        let [id, name, core_type, core_name, rest @ ..] = command.args.as_slice() else {
            return Err(ServiceError::validation(
                "usage: mochi.server.register <id> <\"name\"> <Java|Bedrock> <coreName> [plugin|rcon|terminal]",
            ));
        };
        let core_type = CoreType::parse(core_type)
            .ok_or_else(|| ServiceError::validation("coreType must be Java or Bedrock"))?;
        let mode = match rest.first() {
            None => ConnectionMode::Plugin,
            Some(raw) => ConnectionMode::parse(raw).ok_or_else(|| {
                ServiceError::validation("connection mode must be plugin, rcon, or terminal")
            })?,
        };

        let registered = self
            .hub
            .manager()
            .register(
                RegisterRequest {
                    id: id.clone(),
                    name: name.clone(),
                    core_type,
                    core_name: core_name.clone(),
                    core_version: None,
                    connection_mode: mode,
                    connection_config: serde_json::json!({}),
                    tags: vec![],
                },
                &ctx.actor(),
            )
            .await?;

        Ok(format!(
            "Registered {} ({}). Connector token (shown once):\n{}",
            registered.record.id, registered.record.name, registered.token
        ))
    }

    async fn server_list(&self, ctx: &CommandContext) -> ServiceResult<String> {
        let (servers, _) = self
            .hub
            .manager()
            .list(
                &ServerFilter::default(),
                Page { page: 1, limit: 100 },
                &ctx.actor(),
            )
            .await?;
        if servers.is_empty() {
            return Ok("No servers registered.".into());
        }
        let lines: Vec<String> = servers
            .iter()
            .map(|s| {
                format!(
                    "{} — {} [{}] {}",
                    s.id,
                    s.name,
                    s.status.as_str(),
                    s.core_name
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }

    async fn server_info(
        &self,
        ctx: &CommandContext,
        command: &ParsedCommand,
    ) -> ServiceResult<String> {
        let (server_id, _) = self.server_and_args(ctx, command, 0).await?;
        let record = self.hub.manager().get(&server_id, &ctx.actor()).await?;
        Ok(format!(
            "{} — {}\ncore: {} {} ({:?})\nmode: {}\nstatus: {}\ntags: {}",
            record.id,
            record.name,
            record.core_name,
            record.core_version.as_deref().unwrap_or("?"),
            record.core_type,
            record.connection_mode.as_str(),
            record.status.as_str(),
            if record.tags.is_empty() {
                "-".into()
            } else {
                record.tags.join(", ")
            },
        ))
    }

    async fn server_status(
        &self,
        ctx: &CommandContext,
        command: &ParsedCommand,
    ) -> ServiceResult<String> {
        let (server_id, _) = self.server_and_args(ctx, command, 0).await?;
        let view = self.hub.manager().status(&server_id, &ctx.actor()).await?;
        let mut out = format!("{server_id}: {}", view.status.as_str());
        if let Some(count) = view.player_count {
            out.push_str(&format!(", {count} players"));
        }
        if let Some(tps) = view.tps {
            out.push_str(&format!(", {tps:.1} TPS"));
        }
        if view.pending_operations > 0 {
            out.push_str(&format!(", {} queued ops", view.pending_operations));
        }
        Ok(out)
    }

    async fn server_remove(
        &self,
        ctx: &CommandContext,
        command: &ParsedCommand,
    ) -> ServiceResult<String> {
        let [server_id] = command.args.as_slice() else {
            return Err(ServiceError::validation("usage: mochi.server.remove <id>"));
        };
        self.hub.manager().delete(server_id, &ctx.actor()).await?;
        Ok(format!("Removed {server_id} and all its data."))
    }

    async fn token(&self, ctx: &CommandContext, command: &ParsedCommand) -> ServiceResult<String> {
        let (server_id, _) = self.server_and_args(ctx, command, 0).await?;
        if command.flags.iter().any(|f| f == "r") {
            let token = self
                .hub
                .manager()
                .rotate_token(&server_id, &ctx.actor())
                .await?;
            Ok(format!(
                "Rotated token for {server_id}. New token (shown once):\n{token}"
            ))
        } else {
            Ok(format!(
                "Use mochi.token -r {server_id} to rotate the connector token."
            ))
        }
    }

    async fn roster_mutate(
        &self,
        ctx: &CommandContext,
        command: &ParsedCommand,
        kind: ListKind,
        add: bool,
    ) -> ServiceResult<String> {
        let (server_id, args) = self.server_and_args(ctx, command, 1).await?;
        let [player] = args.as_slice() else {
            return Err(ServiceError::validation("usage: [server] <player>"));
        };
        let outcome = if add {
            self.hub
                .roster
                .add(kind, &server_id, player, &ctx.actor())
                .await?
        } else {
            self.hub
                .roster
                .remove(kind, &server_id, player, &ctx.actor())
                .await?
        };
        Ok(outcome_text(&server_id, player, kind, add, outcome))
    }

    async fn ban_add(&self, ctx: &CommandContext, command: &ParsedCommand) -> ServiceResult<String> {
        // [server] <player> [reason...]; the reason may be several words.
        let (server_id, args) = if command.args.len() >= 2 {
            let (head, rest) = command
                .args
                .split_first()
                .ok_or_else(|| ServiceError::validation("usage: [server] <player> [reason]"))?;
            // Heuristic: if the first arg names a known server, treat it as
            // one; otherwise it is the player on the group's default server.
            match self.hub.store().get_server(head).await {
                Ok(Some(_)) => (head.clone(), rest.iter().map(String::as_str).collect()),
                _ => (
                    self.default_server(ctx).await?,
                    command.args.iter().map(String::as_str).collect(),
                ),
            }
        } else {
            (
                self.default_server(ctx).await?,
                command.args.iter().map(String::as_str).collect::<Vec<_>>(),
            )
        };

        let [player, reason @ ..] = args.as_slice() else {
            return Err(ServiceError::validation("usage: [server] <player> [reason]"));
        };
        let reason = if reason.is_empty() {
            None
        } else {
            Some(reason.join(" "))
        };
        let outcome = self
            .hub
            .roster
            .ban_with_reason(&server_id, player, reason.as_deref(), &ctx.actor())
            .await?;
        Ok(outcome_text(&server_id, player, ListKind::Ban, true, outcome))
    }

    async fn roster_list(
        &self,
        ctx: &CommandContext,
        command: &ParsedCommand,
        kind: ListKind,
    ) -> ServiceResult<String> {
        let (server_id, _) = self.server_and_args(ctx, command, 0).await?;
        let view = self.hub.roster.list(kind, &server_id, &ctx.actor()).await?;
        let label = match kind {
            ListKind::Whitelist => "whitelist",
            ListKind::Ban => "ban list",
        };
        let mut out = if view.players.is_empty() {
            format!("{server_id} {label}: empty")
        } else {
            format!("{server_id} {label}: {}", view.players.join(", "))
        };
        if view.stale {
            out.push_str(" (cached; server offline)");
        }
        Ok(out)
    }

    async fn player_list(
        &self,
        ctx: &CommandContext,
        command: &ParsedCommand,
    ) -> ServiceResult<String> {
        let (server_id, _) = self.server_and_args(ctx, command, 0).await?;
        let listing = self
            .hub
            .players
            .list_online(&server_id, &ctx.actor())
            .await?;
        if listing.stale {
            return Ok(format!("{server_id} is offline; no live player list."));
        }
        let names: Vec<String> = listing
            .players
            .iter()
            .map(|p| {
                p.get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("?")
                    .to_string()
            })
            .collect();
        Ok(format!(
            "{server_id}: {} online{}",
            names.len(),
            if names.is_empty() {
                String::new()
            } else {
                format!(" — {}", names.join(", "))
            }
        ))
    }

    async fn player_kick(
        &self,
        ctx: &CommandContext,
        command: &ParsedCommand,
    ) -> ServiceResult<String> {
        let (server_id, args) = self.server_and_args(ctx, command, 1).await?;
        let [player, reason @ ..] = args.as_slice() else {
            return Err(ServiceError::validation("usage: [server] <player> [reason]"));
        };
        let reason = if reason.is_empty() {
            None
        } else {
            Some(reason.join(" "))
        };
        let outcome = self
            .hub
            .players
            .kick(&server_id, player, reason.as_deref(), &ctx.actor())
            .await?;
        Ok(match outcome {
            MutationOutcome::Applied => format!("Kicked {player} from {server_id}."),
            MutationOutcome::Deferred => {
                format!("{server_id} is offline; kick of {player} queued.")
            },
        })
    }

    async fn command_execute(
        &self,
        ctx: &CommandContext,
        command: &ParsedCommand,
    ) -> ServiceResult<String> {
        // First arg may name a server; everything else is the command line.
        let (server_id, args) = if command.args.len() >= 2
            && matches!(
                self.hub.store().get_server(&command.args[0]).await,
                Ok(Some(_))
            ) {
            (
                command.args[0].clone(),
                command.args[1..].iter().map(String::as_str).collect::<Vec<_>>(),
            )
        } else {
            (
                self.default_server(ctx).await?,
                command.args.iter().map(String::as_str).collect(),
            )
        };
        if args.is_empty() {
            return Err(ServiceError::validation("usage: [server] <command...>"));
        }
        let line = args.join(" ");
        let result = self
            .hub
            .commands
            .execute(&server_id, &line, None, &ctx.actor())
            .await?;
        Ok(if result.output.is_empty() {
            format!("Executed on {server_id} ({} ms).", result.execution_ms)
        } else {
            format!(
                "Executed on {server_id} ({} ms):\n{}",
                result.execution_ms, result.output
            )
        })
    }
}

fn outcome_text(
    server_id: &str,
    player: &str,
    kind: ListKind,
    add: bool,
    outcome: MutationOutcome,
) -> String {
    let action = match (kind, add) {
        (ListKind::Whitelist, true) => "whitelisted",
        (ListKind::Whitelist, false) => "removed from the whitelist",
        (ListKind::Ban, true) => "banned",
        (ListKind::Ban, false) => "unbanned",
    };
    match outcome {
        MutationOutcome::Applied => format!("{player} {action} on {server_id}."),
        MutationOutcome::Deferred => {
            format!("{server_id} is offline; {player} will be {action} on reconnect.")
        },
    }
}

fn help_text() -> String {
    [
        "mochi.server.register <id> <\"name\"> <Java|Bedrock> <coreName> [mode]",
        "mochi.server.list | mochi.server.info [server] | mochi.server.status [server]",
        "mochi.server.remove <id>",
        "mochi.token -r [server]",
        "mochi.whitelist.add|remove [server] <player> | mochi.whitelist.list [server]",
        "mochi.ban.add [server] <player> [reason] | mochi.ban.remove [server] <player>",
        "mochi.player.list [server] | mochi.player.kick [server] <player> [reason]",
        "mochi.cmd [server] <command...>",
    ]
    .join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use {
        async_trait::async_trait,
        mochi_auth::{AclChecker, TokenManager},
        mochi_hub::{
            Auditor, ConnectionChatSink, HubState, PendingOpsEngine, ServerManager,
            SubscriptionRegistry,
        },
        mochi_routing::{GroupDelivery, GroupSink},
        mochi_store::{BindingRecord, SqliteStore},
    };

    struct NullGroupSink;

    #[async_trait]
    impl GroupSink for NullGroupSink {
        async fn deliver(&self, _msg: GroupDelivery) {}
    }

    async fn surface() -> (BotSurface, Arc<Hub>) {
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
        let state = HubState::new(Arc::clone(&manager), tokens, Arc::clone(&router), 16, 60);
        let hub = Hub::new(state, acl, auditor);
        (BotSurface::new(Arc::clone(&hub), router), hub)
    }

    fn ctx(group: Option<&str>) -> CommandContext {
        CommandContext {
            user_id: "op-1".into(),
            user_name: "Op".into(),
            group_id: group.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn register_then_list() {
        let (surface, _hub) = surface().await;
        let reply = surface
            .handle(
                &ctx(None),
                r#"mochi.server.register survival "生存服" Java paper"#,
            )
            .await
            .unwrap();
        assert!(reply.contains("Registered survival"), "got: {reply}");
        // The 64-hex token appears exactly once in the reply.
        assert!(reply.lines().last().unwrap().len() == 64);

        let reply = surface.handle(&ctx(None), "mochi.server.list").await.unwrap();
        assert!(reply.contains("survival"));
        assert!(reply.contains("offline"));
    }

    #[tokio::test]
    async fn group_binding_supplies_default_server() {
        let (surface, hub) = surface().await;
        surface
            .handle(
                &ctx(None),
                r#"mochi.server.register survival "S" Java paper"#,
            )
            .await
            .unwrap();
        hub.store()
            .create_binding(&BindingRecord {
                id: "b1".into(),
                group_id: "g1".into(),
                server_id: "survival".into(),
                binding_type: BindingType::Chat,
                config: serde_json::json!({}),
                created_by: "op-1".into(),
                created_at: 0,
                status: BindingStatus::Active,
                last_used_at: None,
            })
            .await
            .unwrap();

        // No server argument: the group's binding decides.
        let reply = surface
            .handle(&ctx(Some("g1")), "mochi.whitelist.add Alice")
            .await
            .unwrap();
        assert!(reply.contains("offline"), "got: {reply}");
        assert_eq!(hub.store().count_pending("survival").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_group_binding_is_an_error() {
        let (surface, _hub) = surface().await;
        let reply = surface
            .handle(&ctx(Some("g1")), "mochi.whitelist.add Alice")
            .await
            .unwrap();
        assert!(reply.starts_with("Error:"), "got: {reply}");
    }

    #[tokio::test]
    async fn unknown_command_mentions_help() {
        let (surface, _hub) = surface().await;
        let reply = surface.handle(&ctx(None), "mochi.frobnicate").await.unwrap();
        assert!(reply.contains("mochi.help"));
    }

    #[tokio::test]
    async fn plain_chat_is_not_a_command() {
        let (surface, _hub) = surface().await;
        assert!(surface.handle(&ctx(Some("g1")), "hello world").await.is_none());
    }

    #[tokio::test]
    async fn token_rotation_via_flag() {
        let (surface, hub) = surface().await;
        surface
            .handle(&ctx(None), r#"mochi.server.register s1 "S" Java paper"#)
            .await
            .unwrap();
        let before = hub.store().list_tokens("s1").await.unwrap()[0].token.clone();

        let reply = surface.handle(&ctx(None), "mochi.token -r s1").await.unwrap();
        assert!(reply.contains("Rotated token"), "got: {reply}");

        let after = hub.store().list_tokens("s1").await.unwrap();
        assert_eq!(after.len(), 1);
        assert_ne!(after[0].token, before);
    }
}
