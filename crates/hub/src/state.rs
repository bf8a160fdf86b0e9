//! Shared hub runtime state, assembled once in the composition root.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    mochi_auth::{AclChecker, TokenManager},
    mochi_routing::MessageRouter,
};

use crate::{
    audit::Auditor,
    manager::ServerManager,
    services::{CommandService, PlayerService, RosterService, ServiceDeps},
    subscriptions::SubscriptionRegistry,
};

/// Everything the connector-facing WebSocket surface needs.
pub struct HubState {
    pub manager: Arc<ServerManager>,
    pub tokens: Arc<TokenManager>,
    pub router: Arc<MessageRouter>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub max_connections: usize,
    /// Advertised to connectors in the handshake.
    pub report_interval_sec: u64,
    shutting_down: AtomicBool,
}

impl HubState {
    pub fn new(
        manager: Arc<ServerManager>,
        tokens: Arc<TokenManager>,
        router: Arc<MessageRouter>,
        max_connections: usize,
        report_interval_sec: u64,
    ) -> Arc<Self> {
        let subscriptions = Arc::clone(manager.subscriptions());
        Arc::new(Self {
            manager,
            tokens,
            router,
            subscriptions,
            max_connections,
            report_interval_sec,
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Refuse new connections and tear down the existing ones.
    pub async fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.manager.shutdown().await;
    }
}

/// The full service set the operator surfaces (HTTP, bot) work against.
pub struct Hub {
    pub state: Arc<HubState>,
    pub acl: Arc<AclChecker>,
    pub auditor: Arc<Auditor>,
    pub roster: Arc<RosterService>,
    pub players: Arc<PlayerService>,
    pub commands: Arc<CommandService>,
}

impl Hub {
    /// Wire the services over a prepared manager/state pair.
    pub fn new(state: Arc<HubState>, acl: Arc<AclChecker>, auditor: Arc<Auditor>) -> Arc<Self> {
        let deps = ServiceDeps {
            manager: Arc::clone(&state.manager),
            acl: Arc::clone(&acl),
            auditor: Arc::clone(&auditor),
            engine: Arc::clone(state.manager.engine()),
        };
        Arc::new(Self {
            state,
            acl,
            auditor,
            roster: Arc::new(RosterService::new(deps.clone())),
            players: Arc::new(PlayerService::new(deps.clone())),
            commands: Arc::new(CommandService::new(deps)),
        })
    }

    pub fn manager(&self) -> &Arc<ServerManager> {
        &self.state.manager
    }

    pub fn store(&self) -> &Arc<mochi_store::SqliteStore> {
        self.state.manager.store()
    }
}
