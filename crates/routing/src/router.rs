//! Group↔server message routing over the persisted bindings.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use {async_trait::async_trait, tracing::debug};

use mochi_store::{BindingStatus, BindingType, SqliteStore, StoreError};

use crate::{
    config::{ChatBindingConfig, EventBindingConfig},
    filter::{FilterOutcome, apply_rules},
    rate_limit::SlidingWindow,
    template,
};

// ── Messages ─────────────────────────────────────────────────────────────────

/// A chat message arriving from an operator-surface group.
#[derive(Debug, Clone)]
pub struct GroupMessage {
    pub group_id: String,
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    pub timestamp: i64,
}

/// An event pushed up from a connector.
#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub server_id: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: i64,
}

/// A formatted chat line headed for a server.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub server_id: String,
    pub group_id: String,
    pub binding_id: String,
    pub formatted: String,
}

/// A formatted line headed for a group.
#[derive(Debug, Clone)]
pub struct GroupDelivery {
    pub group_id: String,
    pub server_id: String,
    pub binding_id: String,
    pub event_type: String,
    pub formatted: String,
}

// ── Sinks ────────────────────────────────────────────────────────────────────

/// Delivers formatted chat lines into a server (chat injection).
#[async_trait]
pub trait ServerSink: Send + Sync {
    async fn deliver(&self, msg: OutgoingMessage);
}

/// Delivers formatted lines into an operator-surface group.
#[async_trait]
pub trait GroupSink: Send + Sync {
    async fn deliver(&self, msg: GroupDelivery);
}

// ── Statistics ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    pub delivered: u64,
    pub filtered: u64,
    pub rate_limited: u64,
}

/// Per-call outcome, useful for command surfaces and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub delivered: usize,
    pub filtered: usize,
    pub rate_limited: usize,
}

// ── Router ───────────────────────────────────────────────────────────────────

pub struct MessageRouter {
    store: Arc<SqliteStore>,
    server_sink: Arc<dyn ServerSink>,
    group_sink: Arc<dyn GroupSink>,
    limiter: SlidingWindow,
    stats: Mutex<HashMap<String, RouteStats>>,
}

impl MessageRouter {
    pub fn new(
        store: Arc<SqliteStore>,
        server_sink: Arc<dyn ServerSink>,
        group_sink: Arc<dyn GroupSink>,
    ) -> Self {
        Self {
            store,
            server_sink,
            group_sink,
            limiter: SlidingWindow::new(),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Route a group chat message to every bound server.
    pub async fn handle_group_message(
        &self,
        msg: &GroupMessage,
    ) -> Result<RouteReport, StoreError> {
        let mut report = RouteReport::default();

        let bindings = self.store.list_bindings_by_group(&msg.group_id).await?;
        for binding in bindings {
            if binding.status != BindingStatus::Active
                || binding.binding_type != BindingType::Chat
            {
                continue;
            }
            let config: ChatBindingConfig = decode_config(&binding.config);
            if !config.enabled || !config.bidirectional {
                continue;
            }

            let route_key = format!("{}:{}", msg.group_id, binding.server_id);

            let content = match apply_rules(&config.filter_rules, &msg.content, &msg.user_name) {
                FilterOutcome::Pass(content) => content,
                FilterOutcome::Blocked => {
                    debug!(route = %route_key, "message dropped by filter");
                    self.bump(&route_key, |s| s.filtered += 1);
                    report.filtered += 1;
                    continue;
                },
            };

            if let Some(limit) = config.rate_limit
                && !self.limiter.allow(
                    &route_key,
                    Duration::from_millis(limit.window_ms),
                    limit.max_messages,
                )
            {
                debug!(route = %route_key, "message dropped by rate limit");
                self.bump(&route_key, |s| s.rate_limited += 1);
                report.rate_limited += 1;
                continue;
            }

            let formatted = template::render(&config.message_format, &[
                ("group", &msg.group_id),
                ("username", &msg.user_name),
                ("content", &content),
            ]);

            self.server_sink
                .deliver(OutgoingMessage {
                    server_id: binding.server_id.clone(),
                    group_id: msg.group_id.clone(),
                    binding_id: binding.id.clone(),
                    formatted,
                })
                .await;

            self.store.touch_binding(&binding.id).await?;
            self.bump(&route_key, |s| s.delivered += 1);
            report.delivered += 1;
        }

        Ok(report)
    }

    /// Route a connector event to every bound group.
    pub async fn handle_server_event(
        &self,
        event: &ServerEvent,
    ) -> Result<RouteReport, StoreError> {
        let mut report = RouteReport::default();

        let bindings = self.store.list_bindings_by_server(&event.server_id).await?;
        for binding in bindings {
            if binding.status != BindingStatus::Active
                || binding.binding_type != BindingType::Event
            {
                continue;
            }
            let config: EventBindingConfig = decode_config(&binding.config);
            if !config.enabled || !config.event_types.iter().any(|t| t == &event.event_type) {
                continue;
            }

            let route_key = format!("{}:{}", binding.group_id, event.server_id);

            let passes = config.filters.iter().all(|f| {
                event
                    .data
                    .get(&f.field)
                    .map(json_as_string)
                    .is_some_and(|v| v == f.equals)
            });
            if !passes {
                self.bump(&route_key, |s| s.filtered += 1);
                report.filtered += 1;
                continue;
            }

            let formatted =
                template::render_event(&config.message_format, &event.event_type, &event.data);

            self.group_sink
                .deliver(GroupDelivery {
                    group_id: binding.group_id.clone(),
                    server_id: event.server_id.clone(),
                    binding_id: binding.id.clone(),
                    event_type: event.event_type.clone(),
                    formatted,
                })
                .await;

            self.store.touch_binding(&binding.id).await?;
            self.bump(&route_key, |s| s.delivered += 1);
            report.delivered += 1;
        }

        Ok(report)
    }

    /// Snapshot of per-route counters.
    pub fn stats(&self) -> HashMap<String, RouteStats> {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Evict rate windows idle longer than `max_age`.
    pub fn cleanup_rate_windows(&self, max_age: Duration) {
        self.limiter.cleanup(max_age);
    }

    fn bump(&self, route: &str, f: impl FnOnce(&mut RouteStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(stats.entry(route.to_string()).or_default());
    }
}

/// Decode a binding config, falling back to defaults on malformed data the
/// same way the store treats its JSON columns.
fn decode_config<T: serde::de::DeserializeOwned + Default>(value: &serde_json::Value) -> T {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

fn json_as_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use mochi_store::BindingRecord;

    #[derive(Default)]
    struct RecordingSink {
        outgoing: StdMutex<Vec<OutgoingMessage>>,
        deliveries: StdMutex<Vec<GroupDelivery>>,
    }

    #[async_trait]
    impl ServerSink for RecordingSink {
        async fn deliver(&self, msg: OutgoingMessage) {
            self.outgoing.lock().unwrap().push(msg);
        }
    }

    #[async_trait]
    impl GroupSink for RecordingSink {
        async fn deliver(&self, msg: GroupDelivery) {
            self.deliveries.lock().unwrap().push(msg);
        }
    }

    async fn setup(
        config: serde_json::Value,
        binding_type: BindingType,
    ) -> (MessageRouter, Arc<RecordingSink>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        store
            .create_binding(&BindingRecord {
                id: "b1".into(),
                group_id: "g1".into(),
                server_id: "s1".into(),
                binding_type,
                config,
                created_by: "op".into(),
                created_at: 0,
                status: BindingStatus::Active,
                last_used_at: None,
            })
            .await
            .unwrap();
        let sink = Arc::new(RecordingSink::default());
        let router = MessageRouter::new(
            Arc::clone(&store),
            Arc::clone(&sink) as Arc<dyn ServerSink>,
            Arc::clone(&sink) as Arc<dyn GroupSink>,
        );
        (router, sink, store)
    }

    fn group_msg(content: &str) -> GroupMessage {
        GroupMessage {
            group_id: "g1".into(),
            user_id: "u1".into(),
            user_name: "Alice".into(),
            content: content.into(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn filter_then_rate_limit() {
        // Scenario: keyword block on "spam", limit 2 per minute.
        let (router, sink, _store) = setup(
            serde_json::json!({
                "enabled": true,
                "bidirectional": true,
                "filterRules": [
                    { "type": "keyword", "pattern": "spam", "action": "block" }
                ],
                "rateLimit": { "windowMs": 60000, "maxMessages": 2 }
            }),
            BindingType::Chat,
        )
        .await;

        let r1 = router.handle_group_message(&group_msg("hello")).await.unwrap();
        assert_eq!(r1.delivered, 1);

        let r2 = router.handle_group_message(&group_msg("spam here")).await.unwrap();
        assert_eq!(r2.filtered, 1);
        assert_eq!(r2.delivered, 0);

        let r3 = router.handle_group_message(&group_msg("world")).await.unwrap();
        assert_eq!(r3.delivered, 1);

        // Filtered messages do not consume the rate budget; the window now
        // holds two deliveries, so the next one is rate limited.
        let r4 = router.handle_group_message(&group_msg("!")).await.unwrap();
        assert_eq!(r4.rate_limited, 1);

        let sent = sink.outgoing.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].formatted, "[g1] Alice: hello");
        assert_eq!(sent[1].formatted, "[g1] Alice: world");

        let stats = router.stats();
        let route = stats.get("g1:s1").unwrap();
        assert_eq!(route.delivered, 2);
        assert_eq!(route.filtered, 1);
        assert_eq!(route.rate_limited, 1);
    }

    #[tokio::test]
    async fn non_bidirectional_binding_ignored() {
        let (router, sink, _store) = setup(
            serde_json::json!({ "enabled": true, "bidirectional": false }),
            BindingType::Chat,
        )
        .await;
        let report = router.handle_group_message(&group_msg("hi")).await.unwrap();
        assert_eq!(report.delivered, 0);
        assert!(sink.outgoing.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_event_fans_out_to_group() {
        let (router, sink, _store) = setup(
            serde_json::json!({
                "eventTypes": ["player.join"],
                "messageFormat": "{playerName} joined"
            }),
            BindingType::Event,
        )
        .await;

        let report = router
            .handle_server_event(&ServerEvent {
                server_id: "s1".into(),
                event_type: "player.join".into(),
                data: serde_json::json!({ "playerName": "Alice" }),
                timestamp: 0,
            })
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);

        // Non-subscribed type is ignored.
        let report = router
            .handle_server_event(&ServerEvent {
                server_id: "s1".into(),
                event_type: "player.quit".into(),
                data: serde_json::json!({}),
                timestamp: 0,
            })
            .await
            .unwrap();
        assert_eq!(report.delivered, 0);

        let got = sink.deliveries.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].formatted, "Alice joined");
        assert_eq!(got[0].group_id, "g1");
    }

    #[tokio::test]
    async fn event_field_filter() {
        let (router, sink, _store) = setup(
            serde_json::json!({
                "eventTypes": ["player.join"],
                "filters": [{ "field": "world", "equals": "overworld" }]
            }),
            BindingType::Event,
        )
        .await;

        let mk = |world: &str| ServerEvent {
            server_id: "s1".into(),
            event_type: "player.join".into(),
            data: serde_json::json!({ "playerName": "A", "world": world }),
            timestamp: 0,
        };

        assert_eq!(router.handle_server_event(&mk("overworld")).await.unwrap().delivered, 1);
        assert_eq!(router.handle_server_event(&mk("nether")).await.unwrap().filtered, 1);
        assert_eq!(sink.deliveries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn touches_binding_last_used() {
        let (router, _sink, store) = setup(serde_json::json!({}), BindingType::Chat).await;
        router.handle_group_message(&group_msg("hi")).await.unwrap();
        let binding = store.get_binding("b1").await.unwrap().unwrap();
        assert!(binding.last_used_at.is_some());
    }
}
