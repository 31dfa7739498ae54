//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the command service.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::response::{api_reply, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::command::{Command, CommandKind};
use crate::error::JukeboxResult;

/// Service identifier reported by `/health`.
pub const SERVICE_ID: &str = "jukebox";

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /api/sessions/{id}/commands`, e.g.
/// `{"kind":"enqueue","query":"daft punk","voiceChannel":"lounge"}`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandRequest {
    #[serde(flatten)]
    command: CommandKind,
    voice_channel: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let trusted_origins = state.config.read().trusted_origins.clone();
    log::info!("CORS trusted origins: {:?}", trusted_origins);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let origin_str = origin.to_str().unwrap_or("");
            trusted_origins
                .iter()
                .any(|allowed| origin_str.starts_with(allowed))
        }))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}", delete(stop_session))
        .route("/api/sessions/{id}/commands", post(execute_command))
        .route("/api/sessions/{id}/queue", get(get_queue))
        .route("/api/sessions/{id}/now-playing", get(get_now_playing))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "sessions": state.jukebox.registry().len(),
    }))
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.jukebox.registry().session_ids();
    api_success(json!({ "sessions": sessions }))
}

async fn execute_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CommandRequest>,
) -> JukeboxResult<impl IntoResponse> {
    let mut command = Command::new(id, body.command);
    command.voice_channel = body.voice_channel;
    let reply = state.jukebox.execute(command).await?;
    Ok(api_reply(reply))
}

async fn get_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JukeboxResult<impl IntoResponse> {
    let reply = state
        .jukebox
        .execute(Command::new(id, CommandKind::ListQueue))
        .await?;
    Ok(api_reply(reply))
}

async fn get_now_playing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JukeboxResult<impl IntoResponse> {
    let reply = state
        .jukebox
        .execute(Command::new(id, CommandKind::NowPlaying))
        .await?;
    Ok(api_reply(reply))
}

/// Stops the session and clears its queue.
async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> JukeboxResult<impl IntoResponse> {
    let reply = state
        .jukebox
        .execute(Command::new(id, CommandKind::Stop))
        .await?;
    Ok(api_reply(reply))
}
