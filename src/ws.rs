// src/ws.rs
//! WebSocket endpoint for live poll updates.
//!
//! Clients send `joinPoll` / `leavePoll` frames naming a poll id and receive
//! `pollUpdate` frames with the full tallies after every committed vote.
//! There is no replay: a fresh viewer fetches the poll over HTTP first.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broadcast::{ConnectionId, PollHub, ServerMessage};
use crate::poll::{is_poll_id, PollStore};
use crate::AppState;

/// Frames accepted from WebSocket clients.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    JoinPoll {
        #[serde(rename = "pollId")]
        poll_id: String,
    },
    LeavePoll {
        #[serde(rename = "pollId")]
        poll_id: String,
    },
    Ping,
}

/// Browsers send an `Origin` header; only the configured frontend may
/// subscribe. Non-browser clients without the header are accepted.
pub async fn ws_handler<S: PollStore>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        if origin.trim_end_matches('/') != state.config.frontend_url.trim_end_matches('/') {
            warn!("Rejected WebSocket from origin {origin}");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let hub = state.hub.clone();
    let buffer = state.config.subscriber_buffer;
    ws.on_upgrade(move |socket| handle_socket(socket, hub, buffer))
        .into_response()
}

/// Drives one connection until the client goes away, then drops every
/// subscription it held.
async fn handle_socket(socket: WebSocket, hub: Arc<PollHub>, buffer: usize) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(buffer.max(1));
    let conn = hub.connect(tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg_result) = ws_receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!("WebSocket receive error on connection {conn}: {e}");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let reply = handle_text_message(text.as_str(), conn, &hub);
                if tx.send(reply.to_json()).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => {
                debug!("Connection {conn} sent close frame");
                break;
            }
            _ => {}
        }
    }

    hub.disconnect(conn);
    writer.abort();
}

fn handle_text_message(text: &str, conn: ConnectionId, hub: &PollHub) -> ServerMessage {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return ServerMessage::Error {
                message: format!("Invalid message: {e}"),
            }
        }
    };

    match client_msg {
        ClientMessage::JoinPoll { poll_id } => {
            if !is_poll_id(&poll_id) {
                debug!("Connection {conn} asked to watch malformed poll id");
                return ServerMessage::Error {
                    message: "Invalid poll id".to_string(),
                };
            }
            if !hub.join(conn, &poll_id) {
                return ServerMessage::Error {
                    message: format!("Cannot watch poll {poll_id}"),
                };
            }
            ServerMessage::Ack {
                action: "joinPoll".to_string(),
                poll_id,
            }
        }
        ClientMessage::LeavePoll { poll_id } => {
            if hub.leave(conn, &poll_id) {
                ServerMessage::Ack {
                    action: "leavePoll".to_string(),
                    poll_id,
                }
            } else {
                ServerMessage::Error {
                    message: format!("Not watching poll {poll_id}"),
                }
            }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    }
}
