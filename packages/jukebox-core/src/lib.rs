//! Jukebox Core - per-session music playback for group voice sessions.
//!
//! Each session (one per community/group) owns a FIFO playlist and a single
//! worker that acquires audio streams for the head track and drives an
//! external audio sink. Commands arrive from any command source (chat
//! front-end, the bundled HTTP/WS API) through one command service.
//!
//! # Architecture
//!
//! - [`track`], [`queue`], [`volume`]: playlist data model
//! - [`command`]: inbound commands and their acknowledgements
//! - [`services`]: command service, session registry and playback workers
//! - [`collaborators`]: traits for track lookup, stream opening and audio output
//! - [`providers`]: reference collaborator implementations
//! - [`events`]: notifications for listeners
//! - [`api`]: HTTP/WebSocket command surface
//! - [`error`]: centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TrackResolver`], [`StreamProvider`], [`AudioSink`]: external collaborators
//! - [`EventEmitter`](events::EventEmitter): emitting domain events
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning session workers

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod collaborators;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod providers;
pub mod queue;
pub mod runtime;
pub mod services;
pub mod track;
pub mod utils;
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types at the crate root
pub use collaborators::{
    AudioByteStream, AudioSink, Collaborators, OpenedStream, PlayerHandle, PlayerStatus,
    ResourceHandle, SinkEvent, StreamKind, StreamProvider, TrackResolver, TransportHandle,
};
pub use command::{Command, CommandKind, CommandReply};
pub use config::{Config, ControllerConfig};
pub use error::{ErrorCode, JukeboxError, JukeboxResult, ResolveError, SinkError, StreamError};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EndReason, EventEmitter, LoggingEventEmitter,
    PlaybackEvent, SessionEvent,
};
pub use queue::{QueueSnapshot, SessionQueue};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use services::{Jukebox, PlaybackState, SessionHandle, SessionRegistry};
pub use track::{QueryKind, SessionId, SourceKind, Track};
pub use utils::now_millis;

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, ServerError};
