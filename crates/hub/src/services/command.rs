//! Remote console command execution.

use {
    mochi_auth::ops,
    mochi_common::{ServiceError, ServiceResult},
    serde::Deserialize,
};

use crate::{audit::Actor, services::ServiceDeps};

/// Per-server command policy, read from the server record's
/// `connection_config.commandPolicy`. An empty allowlist means everything is
/// allowed (for roles that hold `command.execute` at all); the blocklist
/// always wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CommandPolicy {
    allowlist: Vec<String>,
    blocklist: Vec<String>,
}

/// Result of a console command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CommandResult {
    pub output: String,
    #[serde(rename = "exitCode", skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(rename = "executionMs")]
    pub execution_ms: u64,
}

pub struct CommandService {
    deps: ServiceDeps,
}

impl CommandService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Execute a console command on an online server.
    ///
    /// Commands return output and are therefore never deferred; an offline
    /// server yields `SERVER_OFFLINE`.
    pub async fn execute(
        &self,
        server_id: &str,
        command: &str,
        run_as: Option<&str>,
        actor: &Actor,
    ) -> ServiceResult<CommandResult> {
        self.deps
            .acl
            .require(&actor.user_id, server_id, ops::COMMAND_EXECUTE)
            .await?;

        let command = command.trim();
        if command.is_empty() {
            return Err(ServiceError::validation("command is empty"));
        }

        let record = self
            .deps
            .manager
            .store()
            .get_server(server_id)
            .await
            .map_err(|e| ServiceError::internal_logged("get server", e))?
            .ok_or_else(|| ServiceError::not_found(format!("server {server_id}")))?;

        let policy: CommandPolicy = record
            .connection_config
            .get("commandPolicy")
            .cloned()
            .map(|v| serde_json::from_value(v).unwrap_or_default())
            .unwrap_or_default();

        let head = command
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_start_matches('/')
            .to_ascii_lowercase();

        if policy.blocklist.iter().any(|b| b.eq_ignore_ascii_case(&head)) {
            self.audit_denied(actor, server_id, command).await;
            return Err(ServiceError::permission(format!(
                "command '{head}' is blocked on this server"
            )));
        }
        if !policy.allowlist.is_empty()
            && !policy.allowlist.iter().any(|a| a.eq_ignore_ascii_case(&head))
        {
            self.audit_denied(actor, server_id, command).await;
            return Err(ServiceError::permission(format!(
                "command '{head}' is not on this server's allowlist"
            )));
        }

        if !self.deps.manager.is_online(server_id).await {
            return Err(ServiceError::offline(format!("server {server_id} is offline")));
        }

        let mut data = serde_json::json!({ "command": command });
        if let Some(run_as) = run_as
            && let Some(map) = data.as_object_mut()
        {
            map.insert("runAs".into(), serde_json::Value::String(run_as.into()));
        }

        let started = std::time::Instant::now();
        let audit_data = serde_json::json!({ "command": command, "runAs": run_as });
        match self
            .deps
            .manager
            .request(server_id, "command.execute", data, self.deps.request_timeout())
            .await
        {
            Ok(response) => {
                let result = CommandResult {
                    output: response
                        .get("output")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    exit_code: response
                        .get("exitCode")
                        .and_then(|v| v.as_i64())
                        .map(|v| v as i32),
                    execution_ms: started.elapsed().as_millis() as u64,
                };
                self.deps
                    .auditor
                    .success(actor, Some(server_id), "command.execute", audit_data)
                    .await;
                Ok(result)
            },
            Err(e) => {
                self.deps
                    .auditor
                    .failure(
                        actor,
                        Some(server_id),
                        "command.execute",
                        audit_data,
                        e.to_string(),
                    )
                    .await;
                Err(e.to_service_error())
            },
        }
    }

    async fn audit_denied(&self, actor: &Actor, server_id: &str, command: &str) {
        self.deps
            .auditor
            .failure(
                actor,
                Some(server_id),
                "command.execute",
                serde_json::json!({ "command": command }),
                "denied by command policy".into(),
            )
            .await;
    }
}
