//! WebSocket handler for real-time updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use posecube_core::Snapshot;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{run_command, Command};
use crate::state::AppState;

/// WebSocket message types
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    #[serde(rename = "snapshot")]
    Snapshot(Snapshot),
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "pong")]
    Pong,
}

impl WsMessage {
    fn to_text(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                warn!(error = %e, "Failed to serialize WebSocket message");
                None
            }
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut snapshots = state.component.subscribe();

    info!("WebSocket client connected");

    // Send current state on connect
    let current = snapshots.borrow_and_update().clone();
    if let Some(msg) = WsMessage::Snapshot(current).to_text() {
        if sender.send(msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            // Forward state changes to client
            changed = snapshots.changed() => {
                if changed.is_err() {
                    debug!("Component stopped, closing WebSocket");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(msg) = WsMessage::Snapshot(snapshot).to_text() {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }

            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        let reply = if text.as_str() == "ping" {
                            Some(WsMessage::Pong)
                        } else {
                            handle_command(&state, text.as_str()).await
                        };
                        if let Some(msg) = reply.and_then(|reply| reply.to_text()) {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

/// Run a JSON command; the resulting snapshot reaches the client through
/// the watch channel, so only errors are answered directly.
async fn handle_command(state: &AppState, text: &str) -> Option<WsMessage> {
    let command: Command = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            debug!(error = %e, "Invalid WebSocket command");
            return Some(WsMessage::Error {
                message: format!("Invalid command: {}", e),
            });
        }
    };

    match run_command(&state.component, command).await {
        Ok(_) => None,
        Err(e) => Some(WsMessage::Error {
            message: e.to_string(),
        }),
    }
}
