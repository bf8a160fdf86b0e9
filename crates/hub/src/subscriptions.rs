//! Operator event subscriptions with type and field filters.
//!
//! Subscriptions are ephemeral: they live as long as the subscriber holds
//! the receiving end. Delivery is best-effort; a slow subscriber loses
//! events rather than blocking the connector's reader.

use std::{
    collections::HashMap,
    sync::{Mutex, atomic::{AtomicU64, Ordering}},
};

use {tokio::sync::mpsc, tracing::debug};

/// An event as seen by operator subscribers.
#[derive(Debug, Clone)]
pub struct HubEvent {
    pub server_id: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: i64,
}

/// Field-equality filter on the event payload.
#[derive(Debug, Clone)]
pub struct EventFieldFilter {
    pub field: String,
    pub equals: String,
}

struct Subscription {
    subscriber_id: String,
    /// `None` subscribes across all servers.
    server_id: Option<String>,
    /// Empty matches every event type.
    event_types: Vec<String>,
    filters: Vec<EventFieldFilter>,
    sender: mpsc::Sender<HubEvent>,
}

const SUBSCRIPTION_BUFFER: usize = 256;

/// Fan-out registry for connector events.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subs: Mutex<HashMap<u64, Subscription>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription; the returned receiver is the delivery sink.
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        server_id: Option<String>,
        event_types: Vec<String>,
        filters: Vec<EventFieldFilter>,
    ) -> (u64, mpsc::Receiver<HubEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let sub = Subscription {
            subscriber_id: subscriber_id.into(),
            server_id,
            event_types,
            filters,
            sender: tx,
        };
        self.subs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, sub);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.subs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    /// Deliver an event to every matching subscriber. Dead subscribers are
    /// pruned as they are discovered.
    pub fn publish(&self, event: &HubEvent) {
        let mut subs = self.subs.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|_, sub| {
            if !matches(sub, event) {
                return true;
            }
            match sub.sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(subscriber = %sub.subscriber_id, "subscriber buffer full, dropping event");
                    true
                },
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    pub fn len(&self) -> usize {
        self.subs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches(sub: &Subscription, event: &HubEvent) -> bool {
    if let Some(ref server_id) = sub.server_id
        && server_id != &event.server_id
    {
        return false;
    }
    if !sub.event_types.is_empty() && !sub.event_types.iter().any(|t| t == &event.event_type) {
        return false;
    }
    sub.filters.iter().all(|f| {
        event
            .data
            .get(&f.field)
            .is_some_and(|v| match v {
                serde_json::Value::String(s) => s == &f.equals,
                other => other.to_string() == f.equals,
            })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(server: &str, kind: &str, data: serde_json::Value) -> HubEvent {
        HubEvent {
            server_id: server.into(),
            event_type: kind.into(),
            data,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn type_and_server_matching() {
        let registry = SubscriptionRegistry::new();
        let (_id, mut rx) = registry.subscribe(
            "op-1",
            Some("s1".into()),
            vec!["player.join".into()],
            vec![],
        );

        registry.publish(&event("s1", "player.join", serde_json::json!({})));
        registry.publish(&event("s2", "player.join", serde_json::json!({})));
        registry.publish(&event("s1", "player.quit", serde_json::json!({})));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.server_id, "s1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn field_filters() {
        let registry = SubscriptionRegistry::new();
        let (_id, mut rx) = registry.subscribe(
            "op-1",
            None,
            vec![],
            vec![EventFieldFilter {
                field: "world".into(),
                equals: "nether".into(),
            }],
        );

        registry.publish(&event("s1", "player.join", serde_json::json!({ "world": "nether" })));
        registry.publish(&event("s1", "player.join", serde_json::json!({ "world": "end" })));

        assert_eq!(rx.recv().await.unwrap().data["world"], "nether");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_prunes_subscription() {
        let registry = SubscriptionRegistry::new();
        let (_id, rx) = registry.subscribe("op-1", None, vec![], vec![]);
        drop(rx);
        registry.publish(&event("s1", "x", serde_json::json!({})));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_removes() {
        let registry = SubscriptionRegistry::new();
        let (id, _rx) = registry.subscribe("op-1", None, vec![], vec![]);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
    }
}
