//! WebSocket handler for live notifications.
//!
//! Every connection receives all broadcast events as JSON. Clients may also
//! send commands over the socket; each gets a `COMMAND_RESULT` or `ERROR`
//! frame in response.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::AppState;
use crate::command::{Command, CommandKind, CommandReply};
use crate::error::JukeboxError;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsIncoming {
    Command { payload: WsCommand },
    Heartbeat,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsCommand {
    session_id: String,
    voice_channel: Option<String>,
    command: CommandKind,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    CommandResult {
        #[serde(rename = "sessionId")]
        session_id: String,
        reply: CommandReply,
        message: String,
    },
    Error {
        code: &'static str,
        message: String,
    },
    HeartbeatAck,
}

impl WsOutgoing {
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|json| Message::Text(json.into()))
    }

    fn error(err: &JukeboxError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.broadcast_tx.subscribe());
    log::info!("[WS] New connection established");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_incoming(&state, &text).await;
                        if let Some(msg) = reply.to_message() {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            event = events.next() => {
                match event {
                    Some(Ok(event)) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        log::warn!("[WS] Client lagging, skipped {} event(s)", skipped);
                    }
                    None => break,
                }
            }
        }
    }

    log::info!("[WS] Connection closed");
}

async fn handle_incoming(state: &AppState, text: &str) -> WsOutgoing {
    let incoming = match serde_json::from_str::<WsIncoming>(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            log::debug!("[WS] Unparseable message: {}", e);
            return WsOutgoing::error(&JukeboxError::InvalidRequest(e.to_string()));
        }
    };

    match incoming {
        WsIncoming::Heartbeat => WsOutgoing::HeartbeatAck,
        WsIncoming::Command { payload } => {
            let session_id = payload.session_id;
            let mut command = Command::new(session_id.clone(), payload.command);
            command.voice_channel = payload.voice_channel;
            match state.jukebox.execute(command).await {
                Ok(reply) => WsOutgoing::CommandResult {
                    session_id,
                    message: reply.to_string(),
                    reply,
                },
                Err(e) => WsOutgoing::error(&e),
            }
        }
    }
}
