//! WebSocket handler — one delivery session per socket.
//!
//! DESIGN
//! ======
//! On upgrade the ticket is verified, a `DeliverySession` is created, its hub
//! queue attached, and the session activated. The socket then runs a
//! `select!` loop over three sources:
//! - inbound client frames → parse, dispatch by syscall prefix, reply
//! - the hub queue → `chat:message` frames routed to this connection
//! - presence events → `presence:changed` frames about other users
//!
//! Handlers only ever reply to the sender. Delivery to recipients goes
//! through the router, which owns fan-out. While a request is in flight the
//! loop keeps forwarding this connection's own queue, so two users routing
//! to each other's full queues do not wait on one another.
//!
//! SEND ORDERING
//! =============
//! `chat:send` saves the message as undelivered, routes it, then flags it
//! delivered if any connection took it. A recipient registering mid-route
//! either is in the router's snapshot or drains the saved row from the
//! backlog. In the overlap it may get both; clients dedupe by `id`.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → attach queue → activate → `session:connected`
//! 2. Drain the offline backlog into the socket
//! 3. Relay until the client closes, the socket errors, or the hub drops
//!    the queue after a failed send
//! 4. Close the session (unregister) → detach the queue

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::delivery::{CloseReason, DeliverySession, PresenceEvent, RoutedMessage, UserId};
use crate::frame::{Data, ErrorCode, Frame, SYSCALL_CONNECTED, Status, message_data};
use crate::services::history::HistoryQuery;
use crate::state::AppState;

/// Inbound text that never became a request.
#[derive(Debug, thiserror::Error)]
enum InboundError {
    #[error("invalid json: {0}")]
    BadFrame(#[from] serde_json::Error),
}

impl ErrorCode for InboundError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadFrame(_) => "E_BAD_FRAME",
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(ticket) = params.get("ticket") else {
        return (StatusCode::UNAUTHORIZED, "ticket required").into_response();
    };

    let user_id = match state.tickets.verify(ticket).await {
        Ok(Some(uid)) => uid,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid or expired ticket").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ws ticket validation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "ticket validation error").into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, user_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user_id: UserId) {
    let mut session = DeliverySession::new(user_id, state.presence.clone());
    let connection_id = session.connection_id();

    // Queue first, then registration: a route that sees the connection must find a handle.
    let mut queue = state.hub.attach(connection_id, state.config.client_queue_capacity);
    let mut presence_rx = state.presence.subscribe();
    if let Err(e) = session.activate() {
        warn!(%connection_id, state = ?session.state(), error = %e, "ws: session activation failed");
        let _ = send_frame(&mut socket, &Frame::session_error(&e)).await;
        state.hub.detach(connection_id);
        return;
    }

    info!(%connection_id, %user_id, "ws: client connected");

    let welcome = Frame::request(SYSCALL_CONNECTED, Data::new())
        .with_data("connection_id", connection_id.to_string())
        .with_data("user_id", user_id.to_string());

    let reason = if send_frame(&mut socket, &welcome).await.is_err()
        || drain_backlog(&mut socket, &state, user_id).await.is_err()
    {
        CloseReason::TransportError
    } else {
        relay(&mut socket, &state, user_id, &mut queue, &mut presence_rx).await
    };

    session.close(reason);
    state.hub.detach(connection_id);
    info!(%connection_id, user_id = %session.user_id(), ?reason, "ws: client disconnected");
}

async fn relay(
    socket: &mut WebSocket,
    state: &AppState,
    user_id: UserId,
    queue: &mut mpsc::Receiver<Frame>,
    presence_rx: &mut broadcast::Receiver<PresenceEvent>,
) -> CloseReason {
    let mut presence_open = true;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { return CloseReason::ClientClosed };
                let Ok(msg) = msg else { return CloseReason::TransportError };
                match msg {
                    Message::Text(text) => {
                        let replies = match dispatch_inbound(socket, state, user_id, text.as_str(), queue).await {
                            Ok(replies) => replies,
                            Err(reason) => return reason,
                        };
                        for frame in replies {
                            if send_frame(socket, &frame).await.is_err() {
                                return CloseReason::TransportError;
                            }
                        }
                    }
                    Message::Close(_) => return CloseReason::ClientClosed,
                    _ => {}
                }
            }
            frame = queue.recv() => {
                let Some(frame) = frame else { return CloseReason::QueueClosed };
                if send_frame(socket, &frame).await.is_err() {
                    return CloseReason::TransportError;
                }
            }
            event = presence_rx.recv(), if presence_open => match event {
                Ok(event) if event.user_id != user_id => {
                    if send_frame(socket, &Frame::presence_changed(&event)).await.is_err() {
                        return CloseReason::TransportError;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(%user_id, skipped, "ws: presence events skipped"),
                Err(RecvError::Closed) => presence_open = false,
            },
        }
    }
}

/// Process one inbound request while still forwarding this connection's queue.
async fn dispatch_inbound(
    socket: &mut WebSocket,
    state: &AppState,
    user_id: UserId,
    text: &str,
    queue: &mut mpsc::Receiver<Frame>,
) -> Result<Vec<Frame>, CloseReason> {
    let work = process_inbound_text(state, user_id, text);
    tokio::pin!(work);
    let mut queue_open = true;

    loop {
        tokio::select! {
            replies = &mut work => return Ok(replies),
            frame = queue.recv(), if queue_open => match frame {
                Some(frame) => {
                    if send_frame(socket, &frame).await.is_err() {
                        return Err(CloseReason::TransportError);
                    }
                }
                // The relay loop sees the closed queue on its next turn.
                None => queue_open = false,
            },
        }
    }
}

/// Push messages that arrived while the user was offline.
///
/// A store failure is logged and skipped; the rows stay undelivered and are
/// retried on the next connect.
async fn drain_backlog(socket: &mut WebSocket, state: &AppState, user_id: UserId) -> Result<(), ()> {
    let backlog = match state.store.take_undelivered(user_id).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(%user_id, error = %e, "ws: backlog fetch failed");
            return Ok(());
        }
    };
    if !backlog.is_empty() {
        info!(%user_id, count = backlog.len(), "ws: delivering offline backlog");
    }
    for stored in &backlog {
        send_frame(socket, &Frame::chat_message(&stored.message)).await?;
    }
    Ok(())
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame, returning frames for the sender.
async fn process_inbound_text(state: &AppState, user_id: UserId, text: &str) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%user_id, error = %e, "ws: invalid inbound frame");
            return vec![Frame::session_error(&InboundError::from(e))];
        }
    };

    if req.status != Status::Request {
        return vec![req.error("only request frames are accepted")];
    }

    // The authenticated user, never what the client claims.
    req.from = Some(user_id.to_string());
    debug!(%user_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    let result = match req.prefix() {
        "chat" => handle_chat(state, user_id, &req).await,
        "presence" => handle_presence(state, &req),
        prefix => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    match result {
        Ok(data) => vec![req.done_with(data)],
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// CHAT HANDLERS
// =============================================================================

async fn handle_chat(state: &AppState, user_id: UserId, req: &Frame) -> Result<Data, Frame> {
    match req.op() {
        "send" => send_message(state, user_id, req).await,
        "history" => load_history(state, user_id, req).await,
        op => Err(req.error(format!("unknown chat op: {op}"))),
    }
}

async fn send_message(state: &AppState, user_id: UserId, req: &Frame) -> Result<Data, Frame> {
    let Some(to) = req.data_id::<UserId>("to") else {
        return Err(req.error("to must be a user id"));
    };
    if to == user_id {
        return Err(req.error("cannot message yourself"));
    }

    let content = req.data_str("content").map_or("", str::trim);
    if content.is_empty() {
        return Err(req.error("content required"));
    }
    let max = state.config.max_content_len;
    if content.chars().count() > max {
        return Err(req.error(format!("content exceeds {max} characters")));
    }

    let message = RoutedMessage::new(user_id, to, content);

    // Backlog until a live connection takes it.
    if let Err(e) = state.store.append(&message, false).await {
        warn!(id = %message.id(), error = %e, "chat: persist failed");
        return Err(req.error_from(&e));
    }

    let outcome = state.router.route(message.clone()).await;
    let delivered = outcome.delivered_count();

    if !outcome.reached_nobody() {
        // On failure the row stays in the backlog and is pushed again on the next connect.
        if let Err(e) = state.store.mark_delivered(message.id()).await {
            warn!(id = %message.id(), error = %e, "chat: mark delivered failed");
        }
    }

    let failed: Vec<serde_json::Value> = outcome.failures().iter().map(|e| e.error_code().into()).collect();
    info!(id = %message.id(), from = %user_id, %to, delivered, failed = failed.len(), "chat: message routed");

    let status = if delivered > 0 { "delivered" } else { "offline" };
    let mut data = Data::new();
    data.insert("id".into(), message.id().to_string().into());
    data.insert("created_at".into(), message.created_at().into());
    data.insert("status".into(), status.into());
    data.insert("connections".into(), delivered.into());
    data.insert("failed".into(), failed.into());
    Ok(data)
}

async fn load_history(state: &AppState, user_id: UserId, req: &Frame) -> Result<Data, Frame> {
    let Some(peer) = req.data_id::<UserId>("with") else {
        return Err(req.error("with must be a user id"));
    };
    let query = HistoryQuery::new(
        req.data_i64("limit"),
        req.data_i64("before"),
        state.config.history_default_limit,
        state.config.history_max_limit,
    );

    let rows = state
        .store
        .history(user_id, peer, query)
        .await
        .map_err(|e| req.error_from(&e))?;

    let messages: Vec<serde_json::Value> = rows
        .iter()
        .map(|stored| {
            let mut item = message_data(&stored.message);
            item.insert("delivered".into(), stored.delivered.into());
            serde_json::Value::Object(item.into_iter().collect())
        })
        .collect();

    let mut data = Data::new();
    data.insert("messages".into(), messages.into());
    Ok(data)
}

// =============================================================================
// PRESENCE HANDLER
// =============================================================================

fn handle_presence(state: &AppState, req: &Frame) -> Result<Data, Frame> {
    match req.op() {
        "query" => {
            let Some(target) = req.data_id::<UserId>("user_id") else {
                return Err(req.error("user_id must be a user id"));
            };
            let mut data = Data::new();
            data.insert("user_id".into(), target.to_string().into());
            data.insert("online".into(), state.presence.is_online(target).into());
            Ok(data)
        }
        op => Err(req.error(format!("unknown presence op: {op}"))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.data_str("code").unwrap_or("-");
        let message = frame.data_str("message").unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        debug!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
