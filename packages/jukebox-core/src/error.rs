//! Centralized error types for the jukebox core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborator Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by a [`TrackResolver`](crate::collaborators::TrackResolver).
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The locator does not name a known item.
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    /// The lookup backend could not be reached.
    #[error("Lookup backend unavailable: {0}")]
    Backend(String),
}

impl ErrorCode for ResolveError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownItem(_) => "unknown_item",
            Self::Backend(_) => "resolver_unavailable",
        }
    }
}

/// Errors raised by a [`StreamProvider`](crate::collaborators::StreamProvider).
#[derive(Debug, Error)]
pub enum StreamError {
    /// HTTP request failed (network, DNS, TLS).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status.
    #[error("HTTP {0} for {1}")]
    HttpStatus(u16, String),

    /// The locator cannot be opened by this provider.
    #[error("Unsupported locator: {0}")]
    Unsupported(String),

    /// Opening the stream took longer than the configured limit.
    #[error("Timed out after {0}s")]
    Timeout(u64),
}

impl ErrorCode for StreamError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_, _) => "http_error_status",
            Self::Unsupported(_) => "unsupported_locator",
            Self::Timeout(_) => "stream_timeout",
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Errors raised by an [`AudioSink`](crate::collaborators::AudioSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// Joining the voice transport failed.
    #[error("Transport connection failed: {0}")]
    Connect(String),

    /// The player could not be created or driven.
    #[error("Player error: {0}")]
    Player(String),
}

impl ErrorCode for SinkError {
    fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "transport_connect_failed",
            Self::Player(_) => "player_error",
        }
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;
pub type StreamResult<T> = Result<T, StreamError>;
pub type SinkResult<T> = Result<T, SinkError>;

// ─────────────────────────────────────────────────────────────────────────────
// Application Error
// ─────────────────────────────────────────────────────────────────────────────

/// Error returned to the command source for a single command.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum JukeboxError {
    /// The requester is not present in a voice channel.
    #[error("You need to be in a voice channel")]
    NoVoicePresence,

    /// No active session for the given identifier.
    #[error("Nothing is playing in session {0}")]
    SessionNotFound(String),

    /// The query could not be turned into a playable track.
    #[error("Could not find a track: {0}")]
    ResolutionFailed(String),

    /// A stream could not be opened for a valid track.
    #[error("Could not open audio stream: {0}")]
    StreamAcquisitionFailed(String),

    /// The audio sink refused a pause/resume transition.
    #[error("Could not {0}")]
    SinkCommandRejected(String),

    /// The session worker ended before it could handle the command.
    ///
    /// Only seen internally; the command service retries against a fresh session.
    #[error("Session {0} has ended")]
    SessionEnded(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl JukeboxError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoVoicePresence => "no_voice_presence",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ResolutionFailed(_) => "resolution_failed",
            Self::StreamAcquisitionFailed(_) => "stream_acquisition_failed",
            Self::SinkCommandRejected(_) => "sink_command_rejected",
            Self::SessionEnded(_) => "session_ended",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) | Self::ResolutionFailed(_) => StatusCode::NOT_FOUND,
            Self::NoVoicePresence | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SinkCommandRejected(_) | Self::SessionEnded(_) => StatusCode::CONFLICT,
            Self::StreamAcquisitionFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ErrorCode for JukeboxError {
    fn code(&self) -> &'static str {
        JukeboxError::code(self)
    }
}

/// Convenient Result alias for command handling.
pub type JukeboxResult<T> = Result<T, JukeboxError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for JukeboxError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ResolveError> for JukeboxError {
    fn from(err: ResolveError) -> Self {
        Self::ResolutionFailed(err.to_string())
    }
}

impl From<StreamError> for JukeboxError {
    fn from(err: StreamError) -> Self {
        Self::StreamAcquisitionFailed(err.to_string())
    }
}

impl From<SinkError> for JukeboxError {
    fn from(err: SinkError) -> Self {
        Self::Internal(err.to_string())
    }
}
