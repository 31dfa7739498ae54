//! Application services layer.
//!
//! The command service sits between command sources (API, chat front-ends)
//! and the per-session workers owned by the registry.

pub mod jukebox;
pub(crate) mod playback_controller;
pub mod session_registry;

pub use jukebox::Jukebox;
pub use playback_controller::PlaybackState;
pub use session_registry::{SessionHandle, SessionRegistry};
