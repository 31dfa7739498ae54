//! Registry of live playback sessions.
//!
//! Maps each session identifier to the handle of its worker. At most one
//! worker exists per identifier; creation races are settled by the map's
//! entry API and the loser's transport is released again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::collaborators::Collaborators;
use crate::command::CommandReply;
use crate::config::ControllerConfig;
use crate::error::{JukeboxError, JukeboxResult};
use crate::events::{EndReason, EventEmitter, SessionEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::playback_controller::{
    ControllerParts, PlaybackController, SessionCommand, SessionMessage,
};
use crate::track::SessionId;
use crate::utils::now_millis;

type SessionMap = DashMap<SessionId, SessionHandle>;

/// Cloneable handle to a running session worker.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    session_id: SessionId,
    tx: mpsc::Sender<SessionMessage>,
    cancel: CancellationToken,
    generation: u64,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Identifies this incarnation of the session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the worker behind this handle has shut down.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Sends a command to the worker and waits for its reply.
    ///
    /// Fails with [`JukeboxError::SessionEnded`] if the worker is gone or
    /// shuts down before handling the command.
    pub(crate) async fn request(&self, command: SessionCommand) -> JukeboxResult<CommandReply> {
        let (reply, rx) = oneshot::channel();
        let ended = || JukeboxError::SessionEnded(self.session_id.to_string());
        self.tx
            .send(SessionMessage { command, reply })
            .await
            .map_err(|_| ended())?;
        rx.await.map_err(|_| ended())?
    }
}

/// A worker's claim on its registry entry.
///
/// Releasing removes the entry only if it still belongs to the same
/// generation, so a worker that ends late never evicts its successor. An
/// unreleased slot is released on drop, which covers a worker that panicked.
pub(crate) struct RegistrySlot {
    sessions: Arc<SessionMap>,
    session_id: SessionId,
    generation: u64,
    emitter: Arc<dyn EventEmitter>,
    released: AtomicBool,
}

impl RegistrySlot {
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let generation = self.generation;
        self.sessions
            .remove_if(&self.session_id, |_, handle| handle.generation == generation);
    }
}

impl Drop for RegistrySlot {
    fn drop(&mut self) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        log::error!(
            "[Registry] Worker for session {} exited without teardown",
            self.session_id
        );
        self.release();
        self.emitter.emit_session(SessionEvent::Ended {
            session_id: self.session_id.clone(),
            reason: EndReason::WorkerExited,
            timestamp: now_millis(),
        });
    }
}

/// Owns the map of live sessions and spawns their workers.
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    collaborators: Collaborators,
    emitter: Arc<dyn EventEmitter>,
    config: ControllerConfig,
    spawner: TokioSpawner,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new(
        collaborators: Collaborators,
        emitter: Arc<dyn EventEmitter>,
        config: ControllerConfig,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            collaborators,
            emitter,
            config,
            spawner,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn get(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Returns the live session for `session_id`, creating one bound to
    /// `channel` if none exists. The flag is `true` when this call created it.
    ///
    /// The transport is joined before the map is touched. If another caller
    /// won the race meanwhile, the surplus transport is disconnected and the
    /// winner's handle returned.
    pub async fn get_or_create(
        &self,
        session_id: &SessionId,
        channel: &str,
    ) -> JukeboxResult<(SessionHandle, bool)> {
        if let Some(handle) = self.get(session_id) {
            return Ok((handle, false));
        }

        let sink = Arc::clone(&self.collaborators.sink);
        let transport = sink.connect(session_id, channel).await?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let player = match sink.create_player(session_id, event_tx) {
            Ok(player) => player,
            Err(e) => {
                sink.disconnect(&transport).await;
                return Err(e.into());
            }
        };
        sink.subscribe(&transport, &player);

        let (tx, inbox) = mpsc::channel(self.config.inbox_capacity);
        let cancel = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = SessionHandle {
            session_id: session_id.clone(),
            tx,
            cancel: cancel.clone(),
            generation,
        };

        let existing = match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(handle.clone());
                None
            }
        };

        if let Some(winner) = existing {
            log::debug!(
                "[Registry] Lost creation race for session {}, releasing transport",
                session_id
            );
            sink.stop(&player);
            sink.disconnect(&transport).await;
            return Ok((winner, false));
        }

        let slot = RegistrySlot {
            sessions: Arc::clone(&self.sessions),
            session_id: session_id.clone(),
            generation,
            emitter: Arc::clone(&self.emitter),
            released: AtomicBool::new(false),
        };
        let controller = PlaybackController::new(
            ControllerParts {
                session_id: session_id.clone(),
                transport,
                player,
                inbox,
                sink_events: event_rx,
                cancel,
                slot,
            },
            self.collaborators.clone(),
            Arc::clone(&self.emitter),
            self.config.clone(),
        );

        log::info!(
            "[Registry] Created session {} in channel {} (generation {})",
            session_id,
            channel,
            generation
        );
        self.emitter.emit_session(SessionEvent::Created {
            session_id: session_id.clone(),
            channel: channel.to_string(),
            timestamp: now_millis(),
        });
        self.spawner.spawn(controller.run());
        Ok((handle, true))
    }

    /// Removes the entry without stopping its worker.
    pub fn remove(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions.remove(session_id).map(|(_, handle)| handle)
    }

    /// Removes the entry only if it belongs to `generation`.
    pub fn remove_if_generation(&self, session_id: &SessionId, generation: u64) -> bool {
        self.sessions
            .remove_if(session_id, |_, handle| handle.generation == generation)
            .is_some()
    }

    /// Stops a session and waits (bounded) for its worker to tear down.
    ///
    /// The entry is gone when this returns, even if the worker is slow.
    pub async fn stop(&self, session_id: &SessionId) -> JukeboxResult<()> {
        let handle = self
            .remove(session_id)
            .ok_or_else(|| JukeboxError::SessionNotFound(session_id.to_string()))?;
        handle.cancel.cancel();

        let timeout = self.config.stop_timeout();
        if tokio::time::timeout(timeout, handle.tx.closed()).await.is_err() {
            log::warn!(
                "[Registry] Session {} did not tear down within {:?}",
                session_id,
                timeout
            );
        }
        Ok(())
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stops every session. Used on shutdown.
    pub async fn clear_all(&self) {
        let ids = self.session_ids();
        if !ids.is_empty() {
            log::info!("[Registry] Stopping {} session(s)", ids.len());
        }
        for id in ids {
            // Sessions ending on their own meanwhile are not an error here.
            let _ = self.stop(&id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        AudioSink, OpenedStream, PlayerHandle, ResourceHandle, SinkEvent, TransportHandle,
    };
    use crate::error::SinkResult;
    use crate::providers::NullAudioSink;
    use crate::testing::{wait_until, Fixture, MockProvider, MockResolver, RecordingEmitter};
    use crate::track::Track;
    use async_trait::async_trait;

    #[tokio::test]
    async fn get_or_create_reuses_live_session() {
        let fx = Fixture::new();
        let id = SessionId::from("g1");

        let (first, created) = fx.registry.get_or_create(&id, "voice-1").await.unwrap();
        assert!(created);
        let (second, created) = fx.registry.get_or_create(&id, "voice-2").await.unwrap();
        assert!(!created);

        assert_eq!(first.generation(), second.generation());
        assert_eq!(fx.sink.connect_count(), 1);
        assert_eq!(fx.registry.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creation_yields_one_worker() {
        let fx = Fixture::new();
        let id = SessionId::from("g1");

        let (a, b) = tokio::join!(
            fx.registry.get_or_create(&id, "voice-1"),
            fx.registry.get_or_create(&id, "voice-1"),
        );
        let (a, created_a) = a.unwrap();
        let (b, created_b) = b.unwrap();

        assert_eq!(a.generation(), b.generation());
        assert!(created_a ^ created_b);
        assert_eq!(fx.registry.len(), 1);
        // Every transport except the winner's has been released.
        assert_eq!(fx.sink.connect_count() - fx.sink.disconnect_count(), 1);
    }

    /// Null sink whose connect yields, so concurrent creations interleave.
    struct YieldingSink(NullAudioSink);

    #[async_trait]
    impl AudioSink for YieldingSink {
        async fn connect(
            &self,
            session_id: &SessionId,
            channel: &str,
        ) -> SinkResult<TransportHandle> {
            tokio::task::yield_now().await;
            self.0.connect(session_id, channel).await
        }

        fn create_player(
            &self,
            session_id: &SessionId,
            events: mpsc::UnboundedSender<SinkEvent>,
        ) -> SinkResult<PlayerHandle> {
            self.0.create_player(session_id, events)
        }

        fn create_resource(&self, stream: OpenedStream, volume: f32) -> ResourceHandle {
            self.0.create_resource(stream, volume)
        }

        fn play(&self, player: &PlayerHandle, resource: &ResourceHandle) -> SinkResult<()> {
            self.0.play(player, resource)
        }

        fn pause(&self, player: &PlayerHandle) -> bool {
            self.0.pause(player)
        }

        fn unpause(&self, player: &PlayerHandle) -> bool {
            self.0.unpause(player)
        }

        fn stop(&self, player: &PlayerHandle) {
            self.0.stop(player)
        }

        fn set_volume(&self, resource: &ResourceHandle, volume: f32) {
            self.0.set_volume(resource, volume)
        }

        fn subscribe(&self, transport: &TransportHandle, player: &PlayerHandle) {
            self.0.subscribe(transport, player)
        }

        async fn disconnect(&self, transport: &TransportHandle) {
            self.0.disconnect(transport).await
        }
    }

    #[tokio::test]
    async fn losing_creation_race_keeps_winner_playable() {
        let emitter = Arc::new(RecordingEmitter::default());
        let collaborators = Collaborators::new(
            Arc::new(MockResolver::default()),
            Arc::new(MockProvider::default()),
            Arc::new(YieldingSink(NullAudioSink::new(TokioSpawner::current()))),
        );
        let registry = SessionRegistry::new(
            collaborators,
            emitter.clone(),
            ControllerConfig::default(),
            TokioSpawner::current(),
        );
        let id = SessionId::from("g1");

        let (a, b) = tokio::join!(
            registry.get_or_create(&id, "voice-1"),
            registry.get_or_create(&id, "voice-1"),
        );
        let (winner, created_a) = a.unwrap();
        let (_, created_b) = b.unwrap();
        assert!(created_a && !created_b);

        winner
            .request(SessionCommand::Enqueue(Track::direct(
                "a.mp3",
                "http://media.local/a.mp3",
            )))
            .await
            .unwrap();

        wait_until(|| emitter.now_playing_titles() == ["a.mp3"]).await;
        assert!(emitter.failed_titles().is_empty());
    }

    #[tokio::test]
    async fn stop_unknown_session_is_not_found() {
        let fx = Fixture::new();
        let err = fx.registry.stop(&SessionId::from("nope")).await.unwrap_err();
        assert_eq!(err.code(), "session_not_found");
    }

    #[tokio::test]
    async fn stop_removes_entry_and_disconnects() {
        let fx = Fixture::new();
        let id = SessionId::from("g1");
        let (handle, _) = fx.registry.get_or_create(&id, "voice-1").await.unwrap();

        fx.registry.stop(&id).await.unwrap();

        assert!(!fx.registry.contains(&id));
        assert!(handle.is_closed());
        assert_eq!(fx.sink.disconnect_count(), 1);
        assert_eq!(fx.emitter.ended_reasons(), [EndReason::Stopped]);
    }

    #[tokio::test]
    async fn late_release_does_not_evict_successor() {
        let fx = Fixture::new();
        let id = SessionId::from("g1");
        let (old, _) = fx.registry.get_or_create(&id, "voice-1").await.unwrap();
        fx.registry.remove(&id);
        let (new, _) = fx.registry.get_or_create(&id, "voice-1").await.unwrap();

        assert!(!fx.registry.remove_if_generation(&id, old.generation()));
        assert!(fx.registry.contains(&id));
        assert!(fx.registry.remove_if_generation(&id, new.generation()));
    }

    #[tokio::test]
    async fn request_to_ended_worker_reports_session_ended() {
        let fx = Fixture::new();
        let id = SessionId::from("g1");
        let (handle, _) = fx.registry.get_or_create(&id, "voice-1").await.unwrap();
        fx.registry.stop(&id).await.unwrap();

        let err = handle.request(SessionCommand::ListQueue).await.unwrap_err();
        assert!(matches!(err, JukeboxError::SessionEnded(_)));
    }

    #[tokio::test]
    async fn clear_all_stops_every_session() {
        let fx = Fixture::new();
        for id in ["g1", "g2", "g3"] {
            fx.registry
                .get_or_create(&SessionId::from(id), "voice")
                .await
                .unwrap();
        }

        fx.registry.clear_all().await;

        assert!(fx.registry.is_empty());
        wait_until(|| fx.sink.disconnect_count() == 3).await;
    }
}
