//! Operator-level services: typed facades over the server manager that do
//! ACL checks, audit every mutation, and fall back to the pending-op queue
//! when the target server is offline.

mod command;
mod player;
mod roster;

pub use {
    command::{CommandResult, CommandService},
    player::{OnlinePlayers, PlayerService},
    roster::{ListKind, MutationOutcome, RosterService, RosterView},
};

use std::{sync::Arc, time::Duration};

use mochi_protocol::REQUEST_TIMEOUT_MS;

use crate::{audit::Auditor, manager::ServerManager, pending_ops::PendingOpsEngine};

/// Dependencies shared by every service.
#[derive(Clone)]
pub struct ServiceDeps {
    pub manager: Arc<ServerManager>,
    pub acl: Arc<mochi_auth::AclChecker>,
    pub auditor: Arc<Auditor>,
    pub engine: Arc<PendingOpsEngine>,
}

impl ServiceDeps {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(REQUEST_TIMEOUT_MS)
    }
}
