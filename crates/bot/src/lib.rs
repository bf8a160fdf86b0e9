//! Chat-bot command surface and the group delivery adapter.
//!
//! The hub never speaks to a chat platform directly: inbound group lines
//! come through [`BotSurface::handle`], outbound text leaves through an
//! [`OutboundAdapter`] implementation supplied by the embedding process.

pub mod commands;
pub mod outbound;
pub mod parse;

pub use {
    commands::{BotSurface, CommandContext},
    outbound::{AdapterGroupSink, LoggingAdapter, OutboundAdapter},
    parse::{ParsedCommand, parse},
};
