//! Delivery of formatted group chat into a server's live connection.

use std::sync::Arc;

use {async_trait::async_trait, tracing::debug};

use {
    mochi_protocol::Frame,
    mochi_routing::{OutgoingMessage, ServerSink},
};

use crate::manager::ServerManager;

/// Injects routed group chat as `chat.message` events. Chat is fire-and-
/// forget: messages for offline servers are dropped, not queued.
pub struct ConnectionChatSink {
    manager: Arc<ServerManager>,
}

impl ConnectionChatSink {
    pub fn new(manager: Arc<ServerManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ServerSink for ConnectionChatSink {
    async fn deliver(&self, msg: OutgoingMessage) {
        let Some(handle) = self.manager.connection(&msg.server_id).await else {
            debug!(server_id = %msg.server_id, "chat dropped: server offline");
            return;
        };
        let frame = Frame::event(
            "chat.message",
            serde_json::json!({
                "message": msg.formatted,
                "groupId": msg.group_id,
            }),
        );
        handle.send_event(&frame);
    }
}
