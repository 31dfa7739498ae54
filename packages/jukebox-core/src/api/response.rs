//! HTTP response helper functions for consistent API responses.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

use crate::command::CommandReply;

/// Standard API success response with JSON data.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// Command acknowledgement: the structured reply plus its plain-text rendering.
pub fn api_reply(reply: CommandReply) -> impl IntoResponse {
    let message = reply.to_string();
    api_success(json!({ "reply": reply, "message": message }))
}
