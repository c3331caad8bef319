use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

use darbar_core::net::messages::{AckMsg, ClientMessage, GameAction, RoomSnapshot, ServerMessage};
use darbar_core::net::protocol::{MAX_MESSAGE_SIZE, decode_client_message};

use crate::broadcast::PlayerSender;
use crate::rate_limit::MessageRateLimiter;
use crate::state::{AppState, ConnectionGuard};

/// Chat lines larger than this are refused at the gateway.
const MAX_CHAT_LEN: usize = 1024;

pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    // Sliding-window limit on connection attempts per origin.
    if !state.conn_limiter.check(addr.ip()).await {
        tracing::warn!(ip = %addr.ip(), "Connection attempts rate-limited");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state)))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (ws_sender, mut ws_receiver) = socket.split();

    let (conn_tx, conn_rx) =
        mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    let lobby_rx = state.lobby.subscribe();
    spawn_writer(ws_sender, conn_rx, lobby_rx);

    // The auth collaborator vouches for the id/name pair; the gateway binds
    // the connection to it on the first join and refuses spoofed ids after.
    let mut identity: Option<String> = None;
    let mut current_room: Option<String> = None;

    read_loop(
        &mut ws_receiver,
        &state,
        &conn_tx,
        &mut identity,
        &mut current_room,
    )
    .await;

    if let Some(user_id) = identity {
        state
            .coordinator
            .disconnect(&user_id, current_room.as_deref())
            .await;
        tracing::info!(user = %user_id, "Client disconnected");
    }
}

async fn read_loop(
    ws_receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
    conn_tx: &PlayerSender,
    identity: &mut Option<String>,
    current_room: &mut Option<String>,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut limiter = MessageRateLimiter::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        if !limiter.allow() {
            tracing::warn!(user = ?identity, "Inbound messages rate-limited");
            continue;
        }
        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        let client_msg = match decode_client_message(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "Undecodable client frame");
                send_error(conn_tx, "unrecognized message").await;
                continue;
            },
        };

        match client_msg {
            ClientMessage::JoinRoom(m) => {
                if let Some(bound) = identity.as_deref()
                    && bound != m.user_id
                {
                    ack_err(conn_tx, "not authorized to act for this player").await;
                    continue;
                }
                let name = m.user_name.trim().to_string();
                if name.is_empty() || name.len() > 32 || name.chars().any(|c| c.is_control()) {
                    ack_err(conn_tx, "invalid player name").await;
                    continue;
                }
                match state
                    .coordinator
                    .join_room(&m.room_code, &m.user_id, &name, Some(conn_tx.clone()))
                    .await
                {
                    Ok(room) => {
                        *identity = Some(m.user_id);
                        *current_room = Some(m.room_code);
                        ack_room(conn_tx, room).await;
                    },
                    Err(e) => ack_err(conn_tx, &e.to_string()).await,
                }
            },

            ClientMessage::LeaveRoom(m) => {
                if identity.as_deref() != Some(m.user_id.as_str()) {
                    ack_err(conn_tx, "not authorized to act for this player").await;
                    continue;
                }
                match state.coordinator.leave_room(&m.room_code, &m.user_id).await {
                    Ok(room) => {
                        if current_room.as_deref() == Some(m.room_code.as_str()) {
                            *current_room = None;
                        }
                        ack_room(conn_tx, room).await;
                    },
                    Err(e) => ack_err(conn_tx, &e.to_string()).await,
                }
            },

            ClientMessage::PlayerReady(m) => {
                if identity.as_deref() != Some(m.user_id.as_str()) {
                    ack_err(conn_tx, "not authorized to act for this player").await;
                    continue;
                }
                match state
                    .coordinator
                    .set_ready(&m.room_code, &m.user_id, m.is_ready)
                    .await
                {
                    Ok(room) => ack_room(conn_tx, room).await,
                    Err(e) => ack_err(conn_tx, &e.to_string()).await,
                }
            },

            ClientMessage::StartGame(m) => {
                let Some(user_id) = identity.clone() else {
                    ack_err(conn_tx, "join a room first").await;
                    continue;
                };
                match state.coordinator.start_game(&m.room_code, &user_id).await {
                    Ok(room) => ack_room(conn_tx, room).await,
                    Err(e) => ack_err(conn_tx, &e.to_string()).await,
                }
            },

            ClientMessage::GameAction(m) => {
                let Some(user_id) = identity.clone() else {
                    ack_err(conn_tx, "join a room first").await;
                    continue;
                };
                if let GameAction::ChatMessage { text } = &m.action
                    && (text.len() > MAX_CHAT_LEN
                        || text.chars().any(|c| c.is_control() && c != '\n'))
                {
                    ack_err(conn_tx, "invalid chat message").await;
                    continue;
                }
                match state
                    .coordinator
                    .game_action(&m.room_code, &user_id, m.action)
                    .await
                {
                    Ok(()) => ack_ok(conn_tx).await,
                    Err(e) => ack_err(conn_tx, &e.to_string()).await,
                }
            },
        }
    }
}

/// Forward both the per-connection channel and the global lobby feed out
/// through the socket. Closing either side ends the task.
fn spawn_writer(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut conn_rx: mpsc::Receiver<Bytes>,
    mut lobby_rx: broadcast::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe = conn_rx.recv() => match maybe {
                    Some(data) => {
                        if ws_sender.send(Message::Binary(data)).await.is_err() {
                            break;
                        }
                    },
                    None => break,
                },
                result = lobby_rx.recv() => match result {
                    Ok(data) => {
                        if ws_sender.send(Message::Binary(data)).await.is_err() {
                            break;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Connection lagged behind the lobby feed");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

async fn ack_ok(conn_tx: &PlayerSender) {
    send_ack(conn_tx, AckMsg { success: true, error: None, room: None }).await;
}

async fn ack_room(conn_tx: &PlayerSender, room: RoomSnapshot) {
    send_ack(
        conn_tx,
        AckMsg {
            success: true,
            error: None,
            room: Some(room),
        },
    )
    .await;
}

async fn ack_err(conn_tx: &PlayerSender, error: &str) {
    send_ack(
        conn_tx,
        AckMsg {
            success: false,
            error: Some(error.to_string()),
            room: None,
        },
    )
    .await;
}

async fn send_ack(conn_tx: &PlayerSender, ack: AckMsg) {
    if let Some(bytes) = crate::broadcast::encode(&ServerMessage::Ack(ack)) {
        let _ = conn_tx.send(bytes).await;
    }
}

async fn send_error(conn_tx: &PlayerSender, message: &str) {
    let msg = ServerMessage::Error(darbar_core::net::messages::ErrorMsg {
        message: message.to_string(),
    });
    if let Some(bytes) = crate::broadcast::encode(&msg) {
        let _ = conn_tx.send(bytes).await;
    }
}
