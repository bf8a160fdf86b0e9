//! Typed SQLite persistence for the hub: servers, tokens, ACL, audit,
//! pending operations, group bindings, and the player cache.
//!
//! Table names carry a configurable prefix (`db.prefix`, default `mochi_`).
//! JSON-typed columns decode defensively; see [`json`].

mod acl;
mod audit;
mod bindings;
mod error;
pub mod json;
mod migrate;
mod pending;
mod players;
mod store;
mod tokens;
pub mod types;

pub use {
    error::{Result, StoreError},
    store::{SqliteStore, Tables},
    types::{
        AclEntry, AclRole, ApiTokenRecord, AuditFilter, AuditRecord, AuditResult, BindingRecord,
        BindingStatus, BindingType, ConnectionMode, CoreType, IdentityMarkers, NewAudit, Page,
        PendingOpRecord, PendingOpStatus, PlayerCacheEntry, ServerFilter, ServerRecord,
        ServerStatus, ServerUpdate,
    },
};
