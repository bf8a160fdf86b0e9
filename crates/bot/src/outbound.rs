//! Outbound adapter: how formatted text reaches the chat platform.

use {async_trait::async_trait, tracing::info};

use mochi_routing::{GroupDelivery, GroupSink};

/// Abstract egress to the chat-bot framework. The hub never talks to a chat
/// platform directly; the embedding process implements this.
#[async_trait]
pub trait OutboundAdapter: Send + Sync {
    async fn send_to_group(&self, group_id: &str, text: &str);
}

/// Adapter that only logs; useful until a real chat framework is attached.
pub struct LoggingAdapter;

#[async_trait]
impl OutboundAdapter for LoggingAdapter {
    async fn send_to_group(&self, group_id: &str, text: &str) {
        info!(group_id, text, "outbound group message");
    }
}

/// Bridges the router's server→group deliveries onto the adapter.
pub struct AdapterGroupSink<A: OutboundAdapter> {
    adapter: A,
}

impl<A: OutboundAdapter> AdapterGroupSink<A> {
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl<A: OutboundAdapter> GroupSink for AdapterGroupSink<A> {
    async fn deliver(&self, msg: GroupDelivery) {
        self.adapter.send_to_group(&msg.group_id, &msg.formatted).await;
    }
}
