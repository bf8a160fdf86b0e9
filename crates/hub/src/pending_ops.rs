//! Offline-operation queue: enqueue while a server is offline, optimize and
//! drain when it reconnects.

use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use {
    mochi_common::{ServiceError, ServiceResult, now_ms, sanitize_player_target},
    mochi_store::{PendingOpRecord, PendingOpStatus, SqliteStore},
};

use crate::{
    audit::{Actor, Auditor},
    connection::ConnectionHandle,
};

/// Inverse operation for set-style mutations; such pairs cancel out when
/// nothing observes the state in between.
fn inverse_of(op: &str) -> Option<&'static str> {
    match op {
        "whitelist.add" => Some("whitelist.remove"),
        "whitelist.remove" => Some("whitelist.add"),
        "ban.add" => Some("ban.remove"),
        "ban.remove" => Some("ban.add"),
        _ => None,
    }
}

/// Optimize a pending queue before drain.
///
/// Per target: adjacent duplicates of set-style ops collapse to the first
/// occurrence, and adjacent inverse pairs cancel to nothing. Operations
/// without an inverse (kick, commands) are barriers that preserve order.
/// Returns the surviving ops in enqueue order plus the superseded ids.
pub fn optimize(ops: &[PendingOpRecord]) -> (Vec<PendingOpRecord>, Vec<String>) {
    use std::collections::HashMap;

    // Per-target stacks of indexes into `ops`.
    let mut stacks: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut superseded: Vec<String> = Vec::new();

    for (i, op) in ops.iter().enumerate() {
        let stack = stacks.entry(op.target.as_str()).or_default();
        match stack.last().copied() {
            Some(top)
                if ops[top].operation_type == op.operation_type
                    && inverse_of(&op.operation_type).is_some() =>
            {
                // Duplicate set-op; the first one wins.
                superseded.push(op.id.clone());
            },
            Some(top)
                if inverse_of(&op.operation_type)
                    .is_some_and(|inv| inv == ops[top].operation_type) =>
            {
                // add X then remove X (or the reverse) with nothing in
                // between: both disappear.
                superseded.push(ops[top].id.clone());
                superseded.push(op.id.clone());
                stack.pop();
            },
            _ => stack.push(i),
        }
    }

    let mut kept: Vec<usize> = stacks.into_values().flatten().collect();
    kept.sort_unstable();
    (kept.into_iter().map(|i| ops[i].clone()).collect(), superseded)
}

/// Outcome of draining one server's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub executed: usize,
    pub failed: usize,
    pub superseded: usize,
}

/// The offline-operation engine.
pub struct PendingOpsEngine {
    store: Arc<SqliteStore>,
    auditor: Arc<Auditor>,
    request_timeout: Duration,
}

impl PendingOpsEngine {
    pub fn new(store: Arc<SqliteStore>, auditor: Arc<Auditor>) -> Self {
        Self {
            store,
            auditor,
            request_timeout: Duration::from_millis(mochi_protocol::REQUEST_TIMEOUT_MS),
        }
    }

    /// Queue a mutation for later execution. The target must survive
    /// sanitization; an empty target is a validation error, not a queued
    /// no-op.
    pub async fn enqueue(
        &self,
        server_id: &str,
        operation_type: &str,
        target: &str,
        parameters: serde_json::Value,
    ) -> ServiceResult<PendingOpRecord> {
        let target = sanitize_player_target(target)
            .ok_or_else(|| ServiceError::validation("operation target is empty"))?;

        let record = PendingOpRecord {
            id: uuid::Uuid::new_v4().to_string(),
            server_id: server_id.to_string(),
            operation_type: operation_type.to_string(),
            target,
            parameters,
            status: PendingOpStatus::Pending,
            created_at: now_ms(),
            scheduled_at: None,
            executed_at: None,
        };
        self.store
            .enqueue_pending(&record)
            .await
            .map_err(|e| ServiceError::internal_logged("enqueue pending op", e))?;
        info!(
            server_id,
            operation = operation_type,
            target = %record.target,
            "queued operation for offline server"
        );
        Ok(record)
    }

    pub async fn pending_count(&self, server_id: &str) -> ServiceResult<i64> {
        self.store
            .count_pending(server_id)
            .await
            .map_err(|e| ServiceError::internal_logged("count pending ops", e))
    }

    /// Optimize then drain the queue for the server behind `handle`.
    ///
    /// Strictly sequential in enqueue order; a failed operation is recorded
    /// and the drain continues.
    pub async fn drain(&self, handle: &ConnectionHandle) -> mochi_store::Result<DrainReport> {
        let server_id = handle.server_id.as_str();
        let ops = self.store.list_pending(server_id).await?;
        if ops.is_empty() {
            return Ok(DrainReport::default());
        }

        let (kept, superseded) = optimize(&ops);
        let mut report = DrainReport {
            superseded: superseded.len(),
            ..Default::default()
        };
        for id in &superseded {
            self.store
                .mark_pending_status(id, PendingOpStatus::Done)
                .await?;
        }
        info!(
            server_id,
            total = ops.len(),
            superseded = superseded.len(),
            "draining pending operations"
        );

        let system = Actor::new("system");
        for op in kept {
            self.store
                .mark_pending_status(&op.id, PendingOpStatus::Running)
                .await?;

            let mut data = match op.parameters {
                serde_json::Value::Object(map) => serde_json::Value::Object(map),
                _ => serde_json::json!({}),
            };
            if let Some(map) = data.as_object_mut() {
                map.insert("player".into(), serde_json::Value::String(op.target.clone()));
            }

            match handle
                .request(&op.operation_type, data.clone(), self.request_timeout)
                .await
            {
                Ok(_) => {
                    self.store
                        .mark_pending_status(&op.id, PendingOpStatus::Done)
                        .await?;
                    self.auditor
                        .success(
                            &system,
                            Some(server_id),
                            &op.operation_type,
                            serde_json::json!({ "target": op.target, "deferred": true }),
                        )
                        .await;
                    report.executed += 1;
                },
                Err(e) => {
                    warn!(
                        server_id,
                        operation = %op.operation_type,
                        target = %op.target,
                        error = %e,
                        "deferred operation failed"
                    );
                    self.store
                        .mark_pending_status(&op.id, PendingOpStatus::Failed)
                        .await?;
                    self.auditor
                        .failure(
                            &system,
                            Some(server_id),
                            &op.operation_type,
                            serde_json::json!({ "target": op.target, "deferred": true }),
                            e.to_string(),
                        )
                        .await;
                    report.failed += 1;
                },
            }
        }

        Ok(report)
    }
}
