//! Connector WebSocket lifecycle: admission → handshake → message loop →
//! cleanup. One reader, one write loop fed by the handle's bounded queue,
//! and one heartbeat timer per connection.

use std::{net::SocketAddr, sync::Arc, time::{Duration, Instant}};

use {
    axum::extract::ws::{CloseFrame, Message, WebSocket},
    futures::{SinkExt, stream::{SplitSink, SplitStream, StreamExt}},
    tracing::{debug, info, warn},
};

use mochi_protocol::{
    AUTH_DEADLINE_MS, ConnectorHandshake, Frame, FrameType, HEARTBEAT_INTERVAL_MS,
    HEARTBEAT_MAX_MISSES, HubHandshake, MAX_FRAME_BYTES, PONG_DEADLINE_MS, ProtocolError,
    close_codes, error_codes, system_ops,
};

use {
    mochi_auth::TokenValidation,
    mochi_common::now_ms,
    mochi_routing::ServerEvent,
    mochi_store::ConnectionMode,
};

use crate::{
    connection::{ConnectionHandle, QueueItem},
    state::HubState,
    subscriptions::HubEvent,
};

/// Protocol errors tolerated on one connection before it is closed.
const PROTOCOL_ERROR_LIMIT: u32 = 5;

/// Credentials presented at admission (query params or headers).
#[derive(Debug, Clone, Default)]
pub struct WsCredentials {
    pub server_id: Option<String>,
    pub token: Option<String>,
}

/// Drive one accepted WebSocket through its full lifecycle.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<HubState>,
    creds: WsCredentials,
    remote_addr: SocketAddr,
) {
    let (ws_tx, mut ws_rx) = socket.split();
    let mut ws_tx = ws_tx;

    if state.is_shutting_down() {
        close_now(&mut ws_tx, close_codes::INTERNAL, "shutting down").await;
        return;
    }
    if state.manager.connection_count().await >= state.max_connections {
        warn!(%remote_addr, "connection refused: max connections reached");
        close_now(&mut ws_tx, close_codes::INTERNAL, "too many connections").await;
        return;
    }

    // ── Admission ────────────────────────────────────────────────────────

    let (server_id, token) = match (creds.server_id, creds.token) {
        (Some(server_id), Some(token)) => (server_id, token),
        _ => {
            // No credentials: hold the socket until the auth deadline, then
            // close 1002. (Challenge-response auth is not supported.)
            await_auth_deadline(&mut ws_rx).await;
            info!(%remote_addr, "ws: authentication timeout");
            close_now(&mut ws_tx, close_codes::AUTH_TIMEOUT, "Authentication timeout").await;
            return;
        },
    };

    let record = match state.manager.store().get_server(&server_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            info!(%remote_addr, %server_id, "ws: unknown server");
            close_now(&mut ws_tx, close_codes::AUTH_FAILED, "Authentication failed").await;
            return;
        },
        Err(e) => {
            warn!(error = %e, "ws: store error during admission");
            close_now(&mut ws_tx, close_codes::INTERNAL, "internal error").await;
            return;
        },
    };
    // Only plugin-mode servers dial in; rcon/terminal records are
    // catalogue-only.
    if record.connection_mode != ConnectionMode::Plugin {
        info!(%server_id, mode = record.connection_mode.as_str(), "ws: non-plugin server refused");
        close_now(&mut ws_tx, close_codes::AUTH_FAILED, "Authentication failed").await;
        return;
    }

    match state
        .tokens
        .validate(&server_id, &token, Some(remote_addr.ip()))
        .await
    {
        Ok(TokenValidation::Valid(_)) => {},
        Ok(outcome) => {
            info!(%remote_addr, %server_id, ?outcome, "ws: token rejected");
            close_now(&mut ws_tx, close_codes::AUTH_FAILED, "Authentication failed").await;
            return;
        },
        Err(e) => {
            warn!(error = %e, "ws: token validation error");
            close_now(&mut ws_tx, close_codes::INTERNAL, "internal error").await;
            return;
        },
    }

    // ── Handshake ────────────────────────────────────────────────────────

    let handle = Arc::new(ConnectionHandle::new(
        server_id.clone(),
        Some(remote_addr.ip()),
    ));
    info!(%server_id, conn_id = %handle.conn_id, %remote_addr, "ws: connection authenticated");

    // Write loop: drains the handle's queue into the socket.
    let write_handle = {
        let handle = Arc::clone(&handle);
        tokio::spawn(async move { write_loop(ws_tx, handle).await })
    };

    let hello = HubHandshake {
        hub_version: env!("CARGO_PKG_VERSION").to_string(),
        capabilities: vec![
            "whitelist".into(),
            "ban".into(),
            "player".into(),
            "command".into(),
            "chat".into(),
            "monitoring".into(),
        ],
        heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
        max_frame_bytes: MAX_FRAME_BYTES,
        report_interval_sec: state.report_interval_sec,
    };
    let hello_frame = Frame::system(
        system_ops::HANDSHAKE,
        serde_json::to_value(&hello).unwrap_or_default(),
    );
    if handle.send_control(&hello_frame).is_err() {
        handle.close(close_codes::INTERNAL, "send queue full");
        write_handle.abort();
        return;
    }

    let handshake = match tokio::time::timeout(
        Duration::from_millis(AUTH_DEADLINE_MS),
        wait_for_handshake(&mut ws_rx),
    )
    .await
    {
        Ok(Ok(handshake)) => handshake,
        Ok(Err(e)) => {
            warn!(%server_id, error = %e, "ws: handshake failed");
            handle.close(close_codes::AUTH_FAILED, "handshake failed");
            let _ = write_handle.await;
            return;
        },
        Err(_) => {
            warn!(%server_id, "ws: handshake timeout");
            handle.close(close_codes::AUTH_TIMEOUT, "Authentication timeout");
            let _ = write_handle.await;
            return;
        },
    };

    if let Err(e) = state.manager.bind_connection(Arc::clone(&handle), &handshake).await {
        warn!(%server_id, error = %e, "ws: bind failed");
        handle.close(close_codes::INTERNAL, "internal error");
        let _ = write_handle.await;
        return;
    }

    info!(
        %server_id,
        core = %handshake.core_name,
        version = %handshake.core_version,
        capabilities = handshake.capabilities.len(),
        "ws: handshake complete"
    );

    // Heartbeat timer.
    let heartbeat_handle = {
        let state = Arc::clone(&state);
        let handle = Arc::clone(&handle);
        tokio::spawn(async move { heartbeat_loop(state, handle).await })
    };

    // ── Message loop ─────────────────────────────────────────────────────

    let reason = read_loop(&state, &handle, &mut ws_rx).await;

    // ── Cleanup ──────────────────────────────────────────────────────────

    heartbeat_handle.abort();
    handle.close(close_codes::INTERNAL, reason);
    state
        .manager
        .unbind_connection(&server_id, &handle.conn_id, reason)
        .await;
    let _ = write_handle.await;
    info!(%server_id, conn_id = %handle.conn_id, reason, "ws: connection closed");
}

/// Close an unadmitted socket directly, before any write loop exists.
async fn close_now(ws_tx: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

/// Forward queued frames to the socket; a queued close terminates the loop.
async fn write_loop(mut ws_tx: SplitSink<WebSocket, Message>, handle: Arc<ConnectionHandle>) {
    while let Some(item) = handle.next_outbound().await {
        match item {
            QueueItem::Frame { text, .. } => {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    debug!(conn_id = %handle.conn_id, "ws: write loop closed");
                    return;
                }
            },
            QueueItem::Close { code, reason } => {
                let _ = ws_tx
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
                return;
            },
        }
    }
}

/// Consume frames until the auth deadline passes or the peer goes away.
async fn await_auth_deadline(ws_rx: &mut SplitStream<WebSocket>) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(AUTH_DEADLINE_MS);
    loop {
        match tokio::time::timeout_at(deadline, ws_rx.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(_))) => return,
            Err(_) => return,
        }
    }
}

/// Wait for the connector's `system.handshake` reply.
async fn wait_for_handshake(
    ws_rx: &mut SplitStream<WebSocket>,
) -> anyhow::Result<ConnectorHandshake> {
    while let Some(msg) = ws_rx.next().await {
        let text = match msg? {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => anyhow::bail!("connection closed before handshake"),
            _ => continue,
        };
        let frame = mochi_protocol::decode(&text)
            .map_err(|e| anyhow::anyhow!("invalid frame during handshake: {e}"))?;
        if frame.is_system_op(system_ops::HANDSHAKE) {
            let handshake: ConnectorHandshake = serde_json::from_value(frame.data)
                .map_err(|e| anyhow::anyhow!("invalid handshake payload: {e}"))?;
            return Ok(handshake);
        }
        // Anything else before the handshake is a protocol violation.
        anyhow::bail!("expected system.handshake, got {}", frame.op);
    }
    anyhow::bail!("connection closed before handshake")
}

/// Ping every interval; two consecutive missed pongs close the connection.
async fn heartbeat_loop(state: Arc<HubState>, handle: Arc<ConnectionHandle>) {
    let mut misses: u32 = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(HEARTBEAT_INTERVAL_MS)).await;
        if handle.is_closed() {
            return;
        }
        let sent_at = Instant::now();
        let ping = Frame::system(system_ops::PING, serde_json::json!({}));
        if handle.send_control(&ping).is_err() {
            handle.close(close_codes::INTERNAL, "send queue full");
            state
                .manager
                .unbind_connection(&handle.server_id, &handle.conn_id, "send queue full")
                .await;
            return;
        }

        tokio::time::sleep(Duration::from_millis(PONG_DEADLINE_MS)).await;
        if handle.last_pong() >= sent_at {
            misses = 0;
            continue;
        }
        misses += 1;
        if misses >= HEARTBEAT_MAX_MISSES {
            warn!(server_id = %handle.server_id, "ws: heartbeat lost");
            handle.close(close_codes::INTERNAL, "heartbeat lost");
            state
                .manager
                .unbind_connection(&handle.server_id, &handle.conn_id, "heartbeat lost")
                .await;
            return;
        }
    }
}

/// Dispatch inbound frames until the connection ends; returns the reason.
async fn read_loop(
    state: &Arc<HubState>,
    handle: &Arc<ConnectionHandle>,
    ws_rx: &mut SplitStream<WebSocket>,
) -> &'static str {
    let mut protocol_errors: u32 = 0;

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => return "peer closed",
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %handle.conn_id, error = %e, "ws: read error");
                return "read error";
            },
        };

        let frame = match mochi_protocol::decode(&text) {
            Ok(frame) => {
                protocol_errors = 0;
                frame
            },
            Err(ProtocolError::TooBig(size)) => {
                warn!(conn_id = %handle.conn_id, size, "ws: frame too large");
                let err = Frame::error("", "", error_codes::FRAME_TOO_BIG, "frame too large");
                let _ = handle.send_control(&err);
                handle.close(close_codes::FRAME_TOO_BIG, "frame too large");
                return "frame too large";
            },
            Err(e) => {
                debug!(conn_id = %handle.conn_id, error = %e, "ws: invalid frame");
                let err = Frame::error("", "", e.code(), e.to_string());
                let _ = handle.send_control(&err);
                protocol_errors += 1;
                if protocol_errors >= PROTOCOL_ERROR_LIMIT {
                    handle.close(close_codes::INTERNAL, "repeated protocol errors");
                    return "repeated protocol errors";
                }
                continue;
            },
        };

        match frame.r#type {
            FrameType::Response => {
                handle.complete(&frame.id, Ok(frame.data));
            },
            FrameType::Error => {
                let (code, message) = frame
                    .error
                    .map(|e| (e.code, e.message))
                    .unwrap_or_else(|| ("UNKNOWN".into(), "unspecified error".into()));
                handle.complete(
                    &frame.id,
                    Err(crate::error::RequestError::Remote { code, message }),
                );
            },
            FrameType::Event => {
                dispatch_event(state, handle, frame).await;
            },
            FrameType::System => match frame.op.as_str() {
                system_ops::PING => {
                    let mut pong = Frame::system(system_ops::PONG, serde_json::json!({}));
                    pong.id = frame.id;
                    if handle.send_control(&pong).is_err() {
                        handle.close(close_codes::INTERNAL, "send queue full");
                        return "send queue full";
                    }
                },
                system_ops::PONG => {
                    handle.mark_pong();
                    if let Err(e) = state
                        .manager
                        .store()
                        .set_server_status(
                            &handle.server_id,
                            mochi_store::ServerStatus::Online,
                            Some(now_ms()),
                        )
                        .await
                    {
                        warn!(error = %e, "ws: failed to refresh lastSeen");
                    }
                },
                system_ops::DISCONNECT => {
                    handle.close(close_codes::NORMAL, "client disconnect");
                    return "client disconnect";
                },
                _ => {
                    debug!(op = %frame.op, "ws: ignoring system op");
                },
            },
            FrameType::Request => match frame.op.as_str() {
                system_ops::PING => {
                    let mut pong = Frame::system(system_ops::PONG, serde_json::json!({}));
                    pong.id = frame.id;
                    let _ = handle.send_control(&pong);
                },
                op => {
                    let err = Frame::error(
                        &frame.id,
                        op,
                        error_codes::UNSUPPORTED_OP,
                        format!("unsupported operation: {op}"),
                    );
                    let _ = handle.send_control(&err);
                },
            },
        }
    }
    "peer closed"
}

/// Feed a connector event to subscribers and the group router.
async fn dispatch_event(state: &Arc<HubState>, handle: &Arc<ConnectionHandle>, frame: Frame) {
    if frame.op == "monitoring.report" {
        handle.update_stats(&frame.data);
    }

    state.subscriptions.publish(&HubEvent {
        server_id: handle.server_id.clone(),
        event_type: frame.op.clone(),
        data: frame.data.clone(),
        timestamp: frame.timestamp,
    });

    if let Err(e) = state
        .router
        .handle_server_event(&ServerEvent {
            server_id: handle.server_id.clone(),
            event_type: frame.op,
            data: frame.data,
            timestamp: frame.timestamp,
        })
        .await
    {
        warn!(error = %e, "ws: event routing failed");
    }
}
