//! Trait abstractions for the external collaborators of the core.
//!
//! The playback controller only talks to track lookup, stream opening and
//! audio output through these traits, so each can be swapped for a real
//! integration or a test double.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{ResolveResult, SinkResult, StreamResult};
use crate::track::{QueryKind, SessionId, Track};

/// Boxed byte stream handed from a stream provider to the audio sink.
pub type AudioByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Container format reported by the stream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamKind {
    Mpeg,
    Aac,
    OggOpus,
    WebmOpus,
    Wav,
    /// Unknown container; the sink has to probe it.
    Arbitrary,
}

impl StreamKind {
    /// Maps a `Content-Type` value to a stream kind.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "audio/mpeg" | "audio/mp3" => Self::Mpeg,
            "audio/aac" | "audio/mp4" | "audio/x-m4a" => Self::Aac,
            "audio/ogg" | "audio/opus" => Self::OggOpus,
            "audio/webm" | "video/webm" => Self::WebmOpus,
            "audio/wav" | "audio/x-wav" | "audio/wave" => Self::Wav,
            _ => Self::Arbitrary,
        }
    }
}

/// A stream that has been opened and is ready to be wrapped in a resource.
pub struct OpenedStream {
    pub stream: AudioByteStream,
    pub kind: StreamKind,
}

impl fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedStream")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Connection to a session's voice transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHandle {
    pub id: u64,
    pub session_id: SessionId,
    pub channel: String,
}

/// Control surface of the per-session player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerHandle {
    pub id: u64,
}

/// A playable resource created from an opened stream.
///
/// Resource ids are unique per sink; the controller uses them to discard
/// events that belong to a resource it no longer considers active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub id: u64,
}

/// Player lifecycle status reported by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerStatus {
    /// The resource finished or was stopped; the player has nothing to play.
    Idle,
    Playing,
    Paused,
    /// Rendering failed. The sink follows this with `Idle` for the same resource.
    Error(String),
}

/// Event emitted by the sink for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEvent {
    pub resource_id: u64,
    pub status: PlayerStatus,
}

/// Turns loosely specified metadata into concrete tracks.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Finds the single best playable match for `title` and optional `hint`.
    ///
    /// `Ok(None)` means nothing matched.
    async fn resolve(&self, title: &str, hint: Option<&str>) -> ResolveResult<Option<Track>>;

    /// Fetches metadata for a catalogue item link.
    ///
    /// The returned track normally needs resolution before it can be streamed.
    async fn lookup(&self, locator: &str) -> ResolveResult<Track>;
}

/// Opens byte streams for playable tracks.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Opens a stream for a directly streamable locator.
    async fn open(&self, locator: &str) -> StreamResult<OpenedStream>;

    /// Classifies a raw user query.
    fn validate_kind(&self, query: &str) -> QueryKind;

    /// Builds a direct track for a link classified as [`QueryKind::DirectVideo`].
    async fn describe(&self, locator: &str) -> StreamResult<Track>;
}

/// Renders audio into a session's voice transport.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Joins the session's voice channel.
    async fn connect(&self, session_id: &SessionId, channel: &str)
        -> SinkResult<TransportHandle>;

    /// Creates the session's player. Status changes are delivered on `events`.
    fn create_player(
        &self,
        session_id: &SessionId,
        events: mpsc::UnboundedSender<SinkEvent>,
    ) -> SinkResult<PlayerHandle>;

    /// Wraps an opened stream in a resource with the given gain.
    fn create_resource(&self, stream: OpenedStream, volume: f32) -> ResourceHandle;

    /// Starts playing `resource`, replacing anything already playing.
    fn play(&self, player: &PlayerHandle, resource: &ResourceHandle) -> SinkResult<()>;

    /// Returns `false` when the player is not in a pausable state.
    fn pause(&self, player: &PlayerHandle) -> bool;

    /// Returns `false` when the player is not paused.
    fn unpause(&self, player: &PlayerHandle) -> bool;

    /// Stops the current resource. The sink reports `Idle` for it.
    fn stop(&self, player: &PlayerHandle);

    /// Changes the gain of a live resource.
    fn set_volume(&self, resource: &ResourceHandle, volume: f32);

    /// Routes the player's output into the transport. Idempotent.
    fn subscribe(&self, transport: &TransportHandle, player: &PlayerHandle);

    /// Leaves the voice channel and releases the players routed into it.
    async fn disconnect(&self, transport: &TransportHandle);
}

/// The set of collaborators a session needs, shared by all sessions.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn TrackResolver>,
    pub provider: Arc<dyn StreamProvider>,
    pub sink: Arc<dyn AudioSink>,
}

impl Collaborators {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        provider: Arc<dyn StreamProvider>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            resolver,
            provider,
            sink,
        }
    }
}
