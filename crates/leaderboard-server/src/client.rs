use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use leaderboard_core::ConnectionId;
use leaderboard_engine::{LeaderboardService, Outbound};

/// Control frame sent by a client.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Join { room: String },
    Leave { room: String },
    Ping,
}

/// Reply to a control frame.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerReply {
    Ack {
        action: &'static str,
        room: String,
        changed: bool,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerReply {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Apply one inbound text frame and build the reply.
pub fn handle_client_frame(service: &LeaderboardService, id: &ConnectionId, text: &str) -> ServerReply {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => return ServerReply::error(format!("malformed frame: {e}")),
    };

    let (action, room, result) = match frame {
        ClientFrame::Ping => return ServerReply::Pong,
        ClientFrame::Join { room } => {
            let result = service.on_join_room(id, &room);
            ("join", room, result)
        }
        ClientFrame::Leave { room } => {
            let result = service.on_leave_room(id, &room);
            ("leave", room, result)
        }
    };

    match result {
        Ok(changed) => {
            tracing::debug!(connection_id = %id, room = %room, action, changed, "room membership");
            ServerReply::Ack {
                action,
                room,
                changed,
            }
        }
        Err(e) => ServerReply::error(e.to_string()),
    }
}

/// Handle a WebSocket connection: split into reader/writer, manage lifecycle with heartbeat.
pub async fn handle_ws_connection(
    socket: WebSocket,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<Outbound>,
    service: Arc<LeaderboardService>,
    heartbeat_interval: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued messages to the socket + periodic ping
    let writer_cid = connection_id.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection_id = %writer_cid, "Sent ping");
                }
            }
        }
    });

    // Reader task: apply control frames, track liveness
    let reader_cid = connection_id.clone();
    let reader_service = Arc::clone(&service);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    reader_service.touch(&reader_cid);
                    let reply = handle_client_frame(&reader_service, &reader_cid, text.as_str());
                    match serde_json::to_string(&reply) {
                        Ok(json) => {
                            reader_service.reply(&reader_cid, json);
                        }
                        Err(e) => tracing::warn!(connection_id = %reader_cid, error = %e, "failed to encode reply"),
                    }
                }
                WsMessage::Pong(_) => {
                    reader_service.touch(&reader_cid);
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {
                    // axum answers pings itself
                    reader_service.touch(&reader_cid);
                }
                WsMessage::Binary(_) => {
                    reader_service.reply(
                        &reader_cid,
                        r#"{"type":"error","message":"binary frames are not supported"}"#,
                    );
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    service.on_disconnect(&connection_id);
    tracing::info!(connection_id = %connection_id, "WebSocket client disconnected");
}

/// Start a background task that periodically drops silent connections.
pub fn start_reaper_task(
    service: Arc<LeaderboardService>,
    interval: Duration,
    timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = service.reap_idle(timeout);
            if removed > 0 {
                tracing::info!(removed, "Idle connection cleanup");
            }
        }
    })
}
