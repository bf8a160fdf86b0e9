//! Per-connection runtime state: outbound queue, pending requests, runtime
//! telemetry. One authenticated connection exists per server at a time.

use std::{
    collections::{HashMap, VecDeque},
    net::IpAddr,
    sync::{
        Mutex, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    thiserror::Error,
    tokio::sync::{Notify, oneshot},
};

use mochi_protocol::{Frame, SEND_QUEUE_CAPACITY, close_codes};

use crate::error::RequestError;

// ── Outbound queue ───────────────────────────────────────────────────────────

/// What the write loop pulls off the queue.
#[derive(Debug)]
pub enum QueueItem {
    Frame { class: FrameClass, text: String },
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Droppable under backpressure.
    Event,
    /// Request/response/system traffic; never dropped.
    Control,
}

#[derive(Debug, Error)]
#[error("send queue full")]
pub struct QueueFull;

/// Bounded send queue. Event frames are dropped oldest-first on overflow;
/// control frames report overflow so the caller can close the connection.
struct OutboundQueue {
    items: Mutex<VecDeque<QueueItem>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl OutboundQueue {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns false when an event had to be dropped to make room (the new
    /// event is dropped if no older event exists).
    fn push_event(&self, text: String) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let mut made_room = true;
        if items.len() >= self.capacity {
            if let Some(pos) = items
                .iter()
                .position(|i| matches!(i, QueueItem::Frame { class: FrameClass::Event, .. }))
            {
                items.remove(pos);
            } else {
                // Queue is all control traffic; drop the new event instead.
                return false;
            }
            made_room = false;
        }
        items.push_back(QueueItem::Frame {
            class: FrameClass::Event,
            text,
        });
        drop(items);
        self.notify.notify_one();
        made_room
    }

    fn push_control(&self, text: String) -> Result<(), QueueFull> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueFull);
        }
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if items.len() >= self.capacity {
            return Err(QueueFull);
        }
        items.push_back(QueueItem::Frame {
            class: FrameClass::Control,
            text,
        });
        drop(items);
        self.notify.notify_one();
        Ok(())
    }

    fn push_close(&self, code: u16, reason: String) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return; // already closing
        }
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.push_back(QueueItem::Close { code, reason });
        drop(items);
        self.notify.notify_one();
    }

    async fn pop(&self) -> Option<QueueItem> {
        loop {
            {
                let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }
}

// ── Pending requests ─────────────────────────────────────────────────────────

struct PendingRequest {
    op: String,
    tx: oneshot::Sender<Result<serde_json::Value, RequestError>>,
}

// ── Runtime telemetry ────────────────────────────────────────────────────────

/// Best-effort numbers from recent heartbeat/monitoring frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeStats {
    pub player_count: Option<u32>,
    pub tps: Option<f64>,
}

// ── Connection handle ────────────────────────────────────────────────────────

/// Live connection to one connector, shared between the reader, the write
/// loop, the heartbeat task, and operator-facing services.
pub struct ConnectionHandle {
    pub conn_id: String,
    pub server_id: String,
    pub remote_addr: Option<IpAddr>,
    queue: OutboundQueue,
    pending: Mutex<HashMap<String, PendingRequest>>,
    capabilities: RwLock<Vec<String>>,
    stats: Mutex<RuntimeStats>,
    last_pong: Mutex<Instant>,
    dropped_events: AtomicU64,
}

impl ConnectionHandle {
    pub fn new(server_id: impl Into<String>, remote_addr: Option<IpAddr>) -> Self {
        Self {
            conn_id: uuid::Uuid::new_v4().to_string(),
            server_id: server_id.into(),
            remote_addr,
            queue: OutboundQueue::new(SEND_QUEUE_CAPACITY),
            pending: Mutex::new(HashMap::new()),
            capabilities: RwLock::new(Vec::new()),
            stats: Mutex::new(RuntimeStats::default()),
            last_pong: Mutex::new(Instant::now()),
            dropped_events: AtomicU64::new(0),
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────────

    /// Queue an event frame; drops the oldest event under backpressure.
    pub fn send_event(&self, frame: &Frame) {
        if !self.queue.push_event(frame.encode()) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Queue a control frame (request/response/system). A full queue is an
    /// error; the connection must be closed with `1011` by the caller.
    pub fn send_control(&self, frame: &Frame) -> Result<(), QueueFull> {
        self.queue.push_control(frame.encode())
    }

    /// Begin closing: queue a close frame and fail all pending requests.
    pub fn close(&self, code: u16, reason: &str) {
        self.queue.push_close(code, reason.to_string());
        self.fail_all_pending(RequestError::ConnectionClosed);
    }

    pub fn is_closed(&self) -> bool {
        self.queue.closed.load(Ordering::Acquire)
    }

    /// Next item for the write loop.
    pub async fn next_outbound(&self) -> Option<QueueItem> {
        self.queue.pop().await
    }

    /// Operator-visible count of events dropped under backpressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    // ── Request correlation ──────────────────────────────────────────────

    /// Send a request and await its correlated response.
    ///
    /// Resolves with the response `data`, or with exactly one of
    /// timeout / connection-closed / protocol-error / remote-error.
    pub async fn request(
        &self,
        op: &str,
        data: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, RequestError> {
        let frame = Frame::request(op, data);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(frame.id.clone(), PendingRequest {
                op: op.to_string(),
                tx,
            });
        }

        if self.send_control(&frame).is_err() {
            self.take_pending(&frame.id);
            self.close(close_codes::INTERNAL, "send queue full");
            return Err(RequestError::ConnectionClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Completion side dropped without sending; the connection went away.
            Ok(Err(_)) => Err(RequestError::ConnectionClosed),
            Err(_) => {
                self.take_pending(&frame.id);
                Err(RequestError::Timeout)
            },
        }
    }

    /// Resolve a pending request by response id. Unknown ids are ignored
    /// (late responses after timeout).
    pub fn complete(&self, id: &str, outcome: Result<serde_json::Value, RequestError>) -> bool {
        match self.take_pending(id) {
            Some(pending) => {
                let _ = pending.tx.send(outcome);
                true
            },
            None => false,
        }
    }

    /// Fail every outstanding request, e.g. on close or shutdown.
    pub fn fail_all_pending(&self, err: RequestError) {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain().map(|(_, v)| v).collect()
        };
        for pending in drained {
            tracing::debug!(op = %pending.op, "failing pending request: {err}");
            let _ = pending.tx.send(Err(err.clone()));
        }
    }

    fn take_pending(&self, id: &str) -> Option<PendingRequest> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    // ── Telemetry ────────────────────────────────────────────────────────

    pub fn set_capabilities(&self, caps: Vec<String>) {
        *self.capabilities.write().unwrap_or_else(|e| e.into_inner()) = caps;
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.capabilities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn mark_pong(&self) {
        *self.last_pong.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn last_pong(&self) -> Instant {
        *self.last_pong.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn update_stats(&self, data: &serde_json::Value) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = data.get("playerCount").and_then(|v| v.as_u64()) {
            stats.player_count = Some(count as u32);
        }
        if let Some(tps) = data.get("tps").and_then(|v| v.as_f64()) {
            stats.tps = Some(tps);
        }
    }

    pub fn stats(&self) -> RuntimeStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mochi_protocol::FrameType as Ft;

    fn handle() -> ConnectionHandle {
        ConnectionHandle::new("s1", None)
    }

    #[tokio::test]
    async fn request_resolves_with_matching_response() {
        let h = std::sync::Arc::new(handle());

        let h2 = std::sync::Arc::clone(&h);
        let task = tokio::spawn(async move {
            h2.request(
                "whitelist.add",
                serde_json::json!({ "player": "Alice" }),
                Duration::from_secs(5),
            )
            .await
        });

        // Pull the request off the queue to learn its id.
        let Some(QueueItem::Frame { text, .. }) = h.next_outbound().await else {
            panic!("expected queued frame");
        };
        let frame = mochi_protocol::decode(&text).unwrap();
        assert_eq!(frame.r#type, Ft::Request);

        assert!(h.complete(&frame.id, Ok(serde_json::json!({ "ok": true }))));
        let result = task.await.unwrap().unwrap();
        assert_eq!(result["ok"], true);
        assert_eq!(h.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_once() {
        let h = std::sync::Arc::new(handle());
        let result = h
            .request("player.list", serde_json::Value::Null, Duration::from_millis(50))
            .await;
        assert_eq!(result.unwrap_err(), RequestError::Timeout);
        assert_eq!(h.pending_count(), 0);

        // A late response after timeout is ignored, not double-delivered.
        assert!(!h.complete("whatever", Ok(serde_json::Value::Null)));
    }

    #[tokio::test]
    async fn close_fails_pending() {
        let h = std::sync::Arc::new(handle());
        let h2 = std::sync::Arc::clone(&h);
        let task = tokio::spawn(async move {
            h2.request("player.list", serde_json::Value::Null, Duration::from_secs(30))
                .await
        });

        // Wait until the request is registered.
        while h.pending_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.close(close_codes::REPLACED, "replaced");
        assert_eq!(task.await.unwrap().unwrap_err(), RequestError::ConnectionClosed);
    }

    #[tokio::test]
    async fn event_overflow_drops_oldest_event() {
        let h = handle();
        // Fill with control frames to capacity minus one, then events.
        for _ in 0..SEND_QUEUE_CAPACITY {
            h.send_event(&Frame::event("player.join", serde_json::json!({})));
        }
        assert_eq!(h.dropped_events(), 0);
        h.send_event(&Frame::event("player.join", serde_json::json!({ "n": 1 })));
        assert_eq!(h.dropped_events(), 1);

        // Control frames fail instead of dropping.
        let ping = Frame::system(mochi_protocol::system_ops::PING, serde_json::json!({}));
        assert!(h.send_control(&ping).is_err());
    }

    #[tokio::test]
    async fn close_delivers_close_item_after_queued_frames() {
        let h = handle();
        h.send_event(&Frame::event("e", serde_json::json!({})));
        h.close(close_codes::NORMAL, "bye");

        let first = h.next_outbound().await.unwrap();
        assert!(matches!(first, QueueItem::Frame { .. }));
        let second = h.next_outbound().await.unwrap();
        match second {
            QueueItem::Close { code, .. } => assert_eq!(code, close_codes::NORMAL),
            other => panic!("expected close, got {other:?}"),
        }
        assert!(h.next_outbound().await.is_none());
    }

    #[test]
    fn stats_from_monitoring_payload() {
        let h = handle();
        h.update_stats(&serde_json::json!({ "playerCount": 7, "tps": 19.8 }));
        let stats = h.stats();
        assert_eq!(stats.player_count, Some(7));
        assert_eq!(stats.tps, Some(19.8));
    }
}
