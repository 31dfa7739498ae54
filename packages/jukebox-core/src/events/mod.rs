//! Event system for notifying command sources and listeners.
//!
//! This module provides:
//! - [`EventEmitter`] trait for session workers to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for playback and session lifecycle

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter};

use serde::Serialize;

use crate::track::{SessionId, Track};

/// Events broadcast to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Track-level playback notifications.
    Playback(PlaybackEvent),

    /// Session creation and teardown.
    Session(SessionEvent),
}

/// Notifications about what a session is playing.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// A track's stream was acquired and handed to the sink.
    NowPlaying {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        track: Track,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A track could not be streamed and was dropped from the queue.
    TrackFailed {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        track: Track,
        /// Human-readable failure reason.
        error: String,
        timestamp: u64,
    },
    /// A track left the head of the queue after finishing or being skipped.
    TrackFinished {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        track: Track,
        timestamp: u64,
    },
    Paused {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        timestamp: u64,
    },
    Resumed {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        timestamp: u64,
    },
    VolumeChanged {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        percent: u8,
        timestamp: u64,
    },
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// Explicit stop command.
    Stopped,
    /// The last track finished or failed.
    QueueExhausted,
    /// The worker task ended unexpectedly.
    WorkerExited,
}

/// Session lifecycle events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    Created {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// Voice channel the transport joined.
        channel: String,
        timestamp: u64,
    },
    Ended {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        reason: EndReason,
        timestamp: u64,
    },
}

impl From<PlaybackEvent> for BroadcastEvent {
    fn from(event: PlaybackEvent) -> Self {
        BroadcastEvent::Playback(event)
    }
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_event_is_tagged_by_category_and_type() {
        let event: BroadcastEvent = SessionEvent::Ended {
            session_id: SessionId::from("g1"),
            reason: EndReason::QueueExhausted,
            timestamp: 7,
        }
        .into();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "session");
        assert_eq!(json["type"], "ended");
        assert_eq!(json["sessionId"], "g1");
        assert_eq!(json["reason"], "queueExhausted");
    }
}
