//! The hub core: connector WebSocket handling, request correlation, server
//! lifecycle, the offline-operation queue, operator services, and event
//! fan-out.

pub mod audit;
pub mod chat_sink;
pub mod connection;
pub mod error;
pub mod manager;
pub mod pending_ops;
pub mod server;
pub mod services;
pub mod state;
pub mod subscriptions;
pub mod ws;

pub use {
    audit::{Actor, Auditor},
    chat_sink::ConnectionChatSink,
    connection::{ConnectionHandle, RuntimeStats},
    error::RequestError,
    manager::{RegisterRequest, RegisteredServer, ServerManager, ServerStatusView},
    pending_ops::{DrainReport, PendingOpsEngine, optimize},
    server::{run_ws_server, ws_router},
    services::{
        CommandResult, CommandService, ListKind, MutationOutcome, OnlinePlayers, PlayerService,
        RosterService, RosterView, ServiceDeps,
    },
    state::{Hub, HubState},
    subscriptions::{EventFieldFilter, HubEvent, SubscriptionRegistry},
};
