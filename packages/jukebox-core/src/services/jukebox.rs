//! Command service: the single entry point for command sources.
//!
//! Turns a [`Command`] into registry and session-worker calls. Enqueue
//! queries are classified and resolved into a [`Track`] here, before any
//! session is touched, so a query that matches nothing never creates one.

use std::sync::Arc;

use crate::collaborators::Collaborators;
use crate::command::{Command, CommandKind, CommandReply};
use crate::error::{JukeboxError, JukeboxResult};
use crate::services::playback_controller::SessionCommand;
use crate::services::session_registry::SessionRegistry;
use crate::track::{QueryKind, SessionId, Track};

/// Attempts for an enqueue that races a session ending on its own.
const ENQUEUE_ATTEMPTS: usize = 2;

pub struct Jukebox {
    registry: Arc<SessionRegistry>,
    collaborators: Collaborators,
}

impl Jukebox {
    pub fn new(registry: Arc<SessionRegistry>, collaborators: Collaborators) -> Self {
        Self {
            registry,
            collaborators,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Executes one command and returns its acknowledgement.
    pub async fn execute(&self, command: Command) -> JukeboxResult<CommandReply> {
        let Command {
            session_id,
            voice_channel,
            kind,
        } = command;
        log::debug!("[Jukebox] {} for session {}", kind.name(), session_id);

        match kind {
            CommandKind::Enqueue { query } => {
                let channel = voice_channel.ok_or(JukeboxError::NoVoicePresence)?;
                let track = self.intake(&query).await?;
                self.enqueue(&session_id, &channel, track).await
            }
            CommandKind::Stop => {
                self.registry.stop(&session_id).await?;
                Ok(CommandReply::Stopped)
            }
            CommandKind::Skip => self.forward(&session_id, SessionCommand::Skip).await,
            CommandKind::Pause => self.forward(&session_id, SessionCommand::Pause).await,
            CommandKind::Resume => self.forward(&session_id, SessionCommand::Resume).await,
            CommandKind::SetVolume { percent } => {
                self.forward(&session_id, SessionCommand::SetVolume(percent))
                    .await
            }
            CommandKind::ListQueue => self.forward(&session_id, SessionCommand::ListQueue).await,
            CommandKind::NowPlaying => {
                self.forward(&session_id, SessionCommand::NowPlaying).await
            }
        }
    }

    /// Turns a raw query into a track.
    pub async fn intake(&self, query: &str) -> JukeboxResult<Track> {
        let query = query.trim();
        if query.is_empty() {
            return Err(JukeboxError::InvalidRequest("query must not be empty".into()));
        }

        let kind = self.collaborators.provider.validate_kind(query);
        log::debug!("[Jukebox] Query \"{}\" classified as {:?}", query, kind);
        match kind {
            QueryKind::DirectVideo => Ok(self.collaborators.provider.describe(query).await?),
            QueryKind::DirectPlaylistItem => Ok(self.collaborators.resolver.lookup(query).await?),
            QueryKind::NeedsResolution | QueryKind::Unrecognized => self
                .collaborators
                .resolver
                .resolve(query, None)
                .await?
                .ok_or_else(|| JukeboxError::ResolutionFailed(format!("no results for \"{query}\""))),
        }
    }

    async fn enqueue(
        &self,
        session_id: &SessionId,
        channel: &str,
        track: Track,
    ) -> JukeboxResult<CommandReply> {
        let mut last_err = None;
        for attempt in 1..=ENQUEUE_ATTEMPTS {
            let (handle, _) = self.registry.get_or_create(session_id, channel).await?;
            match handle.request(SessionCommand::Enqueue(track.clone())).await {
                Err(JukeboxError::SessionEnded(id)) => {
                    log::debug!(
                        "[Jukebox] Session {} ended under enqueue (attempt {}), retrying",
                        id,
                        attempt
                    );
                    self.registry
                        .remove_if_generation(session_id, handle.generation());
                    last_err = Some(JukeboxError::SessionEnded(id));
                }
                result => return result,
            }
        }
        Err(last_err.unwrap_or_else(|| JukeboxError::SessionEnded(session_id.to_string())))
    }

    async fn forward(
        &self,
        session_id: &SessionId,
        command: SessionCommand,
    ) -> JukeboxResult<CommandReply> {
        let handle = self
            .registry
            .get(session_id)
            .ok_or_else(|| JukeboxError::SessionNotFound(session_id.to_string()))?;
        handle.request(command).await.map_err(|e| match e {
            JukeboxError::SessionEnded(id) => JukeboxError::SessionNotFound(id),
            other => other,
        })
    }
}
