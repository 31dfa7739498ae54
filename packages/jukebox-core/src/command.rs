//! Inbound commands and their acknowledgements.
//!
//! A command source (chat integration, HTTP API) delivers a [`Command`] and
//! renders the returned [`CommandReply`] or error however it likes. The
//! `Display` impls give a plain-text default.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::queue::QueueSnapshot;
use crate::services::playback_controller::PlaybackState;
use crate::track::{SessionId, Track};

/// What the requester wants done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CommandKind {
    /// Resolve `query` into a track and append it to the session's playlist.
    Enqueue { query: String },
    Skip,
    Stop,
    Pause,
    Resume,
    /// Percentage; values outside 1-100 are clamped.
    SetVolume { percent: i64 },
    ListQueue,
    NowPlaying,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enqueue { .. } => "enqueue",
            Self::Skip => "skip",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::SetVolume { .. } => "set_volume",
            Self::ListQueue => "list_queue",
            Self::NowPlaying => "now_playing",
        }
    }
}

/// A command tagged with the session it targets.
#[derive(Debug, Clone)]
pub struct Command {
    pub session_id: SessionId,
    /// Voice channel the requester is currently in, if any.
    pub voice_channel: Option<String>,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(session_id: impl Into<SessionId>, kind: CommandKind) -> Self {
        Self {
            session_id: session_id.into(),
            voice_channel: None,
            kind,
        }
    }

    #[must_use]
    pub fn in_channel(mut self, channel: impl Into<String>) -> Self {
        self.voice_channel = Some(channel.into());
        self
    }
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandReply {
    /// The track entered the playlist at `position`; 0 means it is the head
    /// and starts playing as soon as its stream is acquired.
    Queued { track: Track, position: usize },
    Skipped,
    Stopped,
    Paused,
    Resumed,
    VolumeSet { percent: u8 },
    Queue {
        state: PlaybackState,
        queue: QueueSnapshot,
    },
    NowPlaying {
        state: PlaybackState,
        track: Track,
    },
}

impl CommandReply {
    /// Whether an enqueue made its track the head of the playlist.
    pub fn is_now_playing(&self) -> bool {
        matches!(self, Self::Queued { position: 0, .. })
    }
}

impl fmt::Display for CommandReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued { track, position: 0 } => write!(f, "Now playing: {}", track.title),
            Self::Queued { track, position } => {
                write!(f, "Added to queue at position {}: {}", position, track.title)
            }
            Self::Skipped => f.write_str("Skipped"),
            Self::Stopped => f.write_str("Stopped and cleared the queue"),
            Self::Paused => f.write_str("Paused"),
            Self::Resumed => f.write_str("Resumed"),
            Self::VolumeSet { percent } => write!(f, "Volume set to {}%", percent),
            Self::Queue { queue, .. } => {
                let Some(head) = &queue.now_playing else {
                    return f.write_str("The queue is empty");
                };
                write!(f, "Now playing: {}", head.title)?;
                for (i, track) in queue.upcoming.iter().enumerate() {
                    write!(f, "\n{}. {}", i + 1, track.title)?;
                }
                Ok(())
            }
            Self::NowPlaying { track, .. } => write!(f, "Now playing: {}", track.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_kind_deserializes_from_tagged_json() {
        let kind: CommandKind =
            serde_json::from_str(r#"{"kind":"enqueue","query":"Song A"}"#).unwrap();
        assert_eq!(
            kind,
            CommandKind::Enqueue {
                query: "Song A".into()
            }
        );

        let kind: CommandKind =
            serde_json::from_str(r#"{"kind":"setVolume","percent":150}"#).unwrap();
        assert_eq!(kind, CommandKind::SetVolume { percent: 150 });

        let kind: CommandKind = serde_json::from_str(r#"{"kind":"skip"}"#).unwrap();
        assert_eq!(kind.name(), "skip");
    }

    #[test]
    fn queued_reply_distinguishes_head_from_backlog() {
        let track = Track::direct("Song B", "http://x/b");
        let head = CommandReply::Queued {
            track: track.clone(),
            position: 0,
        };
        let later = CommandReply::Queued { track, position: 1 };

        assert!(head.is_now_playing());
        assert!(!later.is_now_playing());
        assert_eq!(head.to_string(), "Now playing: Song B");
        assert_eq!(later.to_string(), "Added to queue at position 1: Song B");
    }

    #[test]
    fn queue_reply_lists_head_then_numbered_tracks() {
        let reply = CommandReply::Queue {
            state: PlaybackState::Playing,
            queue: QueueSnapshot {
                now_playing: Some(Track::direct("A", "a")),
                upcoming: vec![Track::direct("B", "b"), Track::direct("C", "c")],
                volume_percent: 50,
            },
        };
        assert_eq!(reply.to_string(), "Now playing: A\n1. B\n2. C");
    }
}
