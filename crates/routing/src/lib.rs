//! Group↔server chat and event routing.
//!
//! Bindings persisted by the store decide which groups and servers talk to
//! each other; this crate evaluates filters, rate limits, and message
//! templates, then hands formatted lines to typed sinks (the hub's chat
//! injection on one side, the bot surface on the other).

pub mod config;
pub mod filter;
pub mod rate_limit;
pub mod router;
pub mod template;

pub use {
    config::{
        ChatBindingConfig, EventBindingConfig, EventFilter, FilterAction, FilterRule,
        FilterRuleType, RateLimit,
    },
    filter::{FilterOutcome, apply_rules},
    rate_limit::SlidingWindow,
    router::{
        GroupDelivery, GroupMessage, GroupSink, MessageRouter, OutgoingMessage, RouteReport,
        RouteStats, ServerEvent, ServerSink,
    },
};
