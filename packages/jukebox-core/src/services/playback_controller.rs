//! Per-session playback state machine.
//!
//! Responsibilities:
//! - Own the session's playlist, volume, transport and player
//! - Acquire a stream for the playlist head and hand it to the audio sink
//! - Drop tracks whose stream cannot be acquired and move on
//! - Apply pause/resume/skip/volume commands
//! - Tear the session down on stop or when the playlist runs out
//!
//! Each session runs one controller task. Commands and sink events arrive on
//! channels and are handled strictly one at a time, so every mutation of the
//! playlist, volume and state is linearised per session.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::collaborators::{
    Collaborators, OpenedStream, PlayerHandle, PlayerStatus, ResourceHandle, SinkEvent,
    StreamProvider, TrackResolver, TransportHandle,
};
use crate::command::CommandReply;
use crate::config::ControllerConfig;
use crate::error::{JukeboxError, JukeboxResult, StreamError};
use crate::events::{EndReason, EventEmitter, PlaybackEvent, SessionEvent};
use crate::queue::SessionQueue;
use crate::services::session_registry::RegistrySlot;
use crate::track::{SessionId, Track};
use crate::utils::now_millis;
use crate::volume::{clamp_percent, percent_to_gain};

/// Playback state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    /// Nothing targeted yet (fresh session) or the playlist ran out.
    Idle,
    /// Resolving and opening a stream for the head track.
    Loading,
    Playing,
    Paused,
    /// Torn down; the registry entry is gone.
    Stopped,
}

/// Commands a session worker understands. Stop is delivered through the
/// session's cancellation token instead so it can interrupt a load.
#[derive(Debug, Clone)]
pub(crate) enum SessionCommand {
    Enqueue(Track),
    Skip,
    Pause,
    Resume,
    SetVolume(i64),
    ListQueue,
    NowPlaying,
}

/// A command plus the channel its acknowledgement goes back on.
#[derive(Debug)]
pub(crate) struct SessionMessage {
    pub command: SessionCommand,
    pub reply: oneshot::Sender<JukeboxResult<CommandReply>>,
}

/// What the loading loop should do after handling a message.
enum LoadControl {
    Continue,
    SkipHead,
}

/// Outcome of one step of the run loop; `Some` ends the session.
type Step = Option<EndReason>;

/// Single-writer state machine for one session.
pub(crate) struct PlaybackController {
    session_id: SessionId,
    queue: SessionQueue,
    state: PlaybackState,
    transport: TransportHandle,
    player: PlayerHandle,
    /// Set only while a resource is in the sink.
    active: Option<ResourceHandle>,
    consecutive_failures: u32,
    collaborators: Collaborators,
    emitter: Arc<dyn EventEmitter>,
    config: ControllerConfig,
    inbox: mpsc::Receiver<SessionMessage>,
    sink_events: mpsc::UnboundedReceiver<SinkEvent>,
    cancel: CancellationToken,
    slot: RegistrySlot,
}

/// Channels and handles a controller is built from.
pub(crate) struct ControllerParts {
    pub session_id: SessionId,
    pub transport: TransportHandle,
    pub player: PlayerHandle,
    pub inbox: mpsc::Receiver<SessionMessage>,
    pub sink_events: mpsc::UnboundedReceiver<SinkEvent>,
    pub cancel: CancellationToken,
    pub slot: RegistrySlot,
}

impl PlaybackController {
    pub fn new(
        parts: ControllerParts,
        collaborators: Collaborators,
        emitter: Arc<dyn EventEmitter>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            session_id: parts.session_id,
            queue: SessionQueue::with_volume(config.default_volume()),
            state: PlaybackState::Idle,
            transport: parts.transport,
            player: parts.player,
            active: None,
            consecutive_failures: 0,
            collaborators,
            emitter,
            config,
            inbox: parts.inbox,
            sink_events: parts.sink_events,
            cancel: parts.cancel,
            slot: parts.slot,
        }
    }

    /// Runs the session until it is stopped or its playlist is exhausted.
    pub async fn run(mut self) {
        log::info!("[Controller] Session {} started", self.session_id);
        let reason = loop {
            let step = match self.state {
                PlaybackState::Loading => self.load_head().await,
                _ => self.wait_for_input().await,
            };
            if let Some(reason) = step {
                break reason;
            }
        };
        self.teardown(reason).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Stop wins over everything, and queued commands are served before
    /// sink events that are ready at the same time.
    async fn wait_for_input(&mut self) -> Step {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Some(EndReason::Stopped),
            msg = self.inbox.recv() => match msg {
                Some(msg) => self.handle_message(msg),
                None => Some(EndReason::Stopped),
            },
            Some(event) = self.sink_events.recv() => self.handle_sink_event(event),
        }
    }

    /// Acquires a stream for the head track and starts it, or drops the head
    /// on failure. Commands keep being served while the acquisition runs; a
    /// skip abandons it and a stop cancels it.
    async fn load_head(&mut self) -> Step {
        let Some(track) = self.queue.peek_front().cloned() else {
            return Some(EndReason::QueueExhausted);
        };

        if let Some(delay) = self.config.backoff_delay(self.consecutive_failures) {
            log::warn!(
                "[Controller] Session {}: {} consecutive failures, waiting {:?} before next track",
                self.session_id,
                self.consecutive_failures,
                delay
            );
            let backoff = tokio::time::sleep(delay);
            tokio::pin!(backoff);
            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Some(EndReason::Stopped),
                    _ = &mut backoff => break,
                    msg = self.inbox.recv() => match msg {
                        None => return Some(EndReason::Stopped),
                        Some(msg) => {
                            if let LoadControl::SkipHead = self.handle_while_loading(msg) {
                                return self.finish_head();
                            }
                        }
                    },
                    Some(event) = self.sink_events.recv() => {
                        self.handle_sink_event(event);
                    }
                }
            }
        }

        log::debug!(
            "[Controller] Session {}: acquiring stream for \"{}\"",
            self.session_id,
            track.title
        );
        let acquisition = acquire_stream(
            Arc::clone(&self.collaborators.resolver),
            Arc::clone(&self.collaborators.provider),
            track.clone(),
            self.config.acquisition_timeout(),
        );
        tokio::pin!(acquisition);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Some(EndReason::Stopped),
                result = &mut acquisition => break result,
                msg = self.inbox.recv() => match msg {
                    None => return Some(EndReason::Stopped),
                    Some(msg) => {
                        if let LoadControl::SkipHead = self.handle_while_loading(msg) {
                            log::info!(
                                "[Controller] Session {}: skip during load, abandoning \"{}\"",
                                self.session_id,
                                track.title
                            );
                            return self.finish_head();
                        }
                    }
                },
                Some(event) = self.sink_events.recv() => {
                    // No resource is active while loading, so this is stale.
                    self.handle_sink_event(event);
                }
            }
        };

        match outcome {
            Ok(opened) => self.start_playback(track, opened),
            Err(e) => self.drop_failed_head(e),
        }
    }

    fn handle_while_loading(&mut self, msg: SessionMessage) -> LoadControl {
        if let SessionCommand::Skip = msg.command {
            let _ = msg.reply.send(Ok(CommandReply::Skipped));
            return LoadControl::SkipHead;
        }
        // Other commands never end the session while loading.
        let _ = self.handle_message(msg);
        LoadControl::Continue
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_message(&mut self, msg: SessionMessage) -> Step {
        let SessionMessage { command, reply } = msg;
        let (result, step) = match command {
            SessionCommand::Enqueue(track) => (Ok(self.enqueue(track)), None),
            SessionCommand::Skip => self.skip(),
            SessionCommand::Pause => (self.pause(), None),
            SessionCommand::Resume => (self.resume(), None),
            SessionCommand::SetVolume(percent) => (Ok(self.set_volume(percent)), None),
            SessionCommand::ListQueue => (
                Ok(CommandReply::Queue {
                    state: self.state,
                    queue: self.queue.snapshot(),
                }),
                None,
            ),
            SessionCommand::NowPlaying => (self.now_playing(), None),
        };
        if reply.send(result).is_err() {
            log::debug!(
                "[Controller] Session {}: requester went away before reply",
                self.session_id
            );
        }
        step
    }

    fn enqueue(&mut self, track: Track) -> CommandReply {
        let len = self.queue.enqueue(track.clone());
        log::info!(
            "[Controller] Session {}: queued \"{}\" at position {}",
            self.session_id,
            track.title,
            len - 1
        );
        if self.state == PlaybackState::Idle {
            self.state = PlaybackState::Loading;
        }
        CommandReply::Queued {
            track,
            position: len - 1,
        }
    }

    /// Skip stops the active resource; the sink's `Idle` event then advances
    /// the playlist. Without an active resource the head is finished directly.
    fn skip(&mut self) -> (JukeboxResult<CommandReply>, Step) {
        if self.active.is_some() {
            self.collaborators.sink.stop(&self.player);
            (Ok(CommandReply::Skipped), None)
        } else {
            (Ok(CommandReply::Skipped), self.finish_head())
        }
    }

    fn pause(&mut self) -> JukeboxResult<CommandReply> {
        if !self.collaborators.sink.pause(&self.player) {
            return Err(JukeboxError::SinkCommandRejected("pause".into()));
        }
        self.state = PlaybackState::Paused;
        self.emitter.emit_playback(PlaybackEvent::Paused {
            session_id: self.session_id.clone(),
            timestamp: now_millis(),
        });
        Ok(CommandReply::Paused)
    }

    fn resume(&mut self) -> JukeboxResult<CommandReply> {
        if !self.collaborators.sink.unpause(&self.player) {
            return Err(JukeboxError::SinkCommandRejected("resume".into()));
        }
        self.state = PlaybackState::Playing;
        self.emitter.emit_playback(PlaybackEvent::Resumed {
            session_id: self.session_id.clone(),
            timestamp: now_millis(),
        });
        Ok(CommandReply::Resumed)
    }

    fn set_volume(&mut self, percent: i64) -> CommandReply {
        let percent = clamp_percent(percent);
        let gain = percent_to_gain(i64::from(percent));
        self.queue.set_volume(gain);
        if let Some(resource) = &self.active {
            self.collaborators.sink.set_volume(resource, gain);
        }
        self.emitter.emit_playback(PlaybackEvent::VolumeChanged {
            session_id: self.session_id.clone(),
            percent,
            timestamp: now_millis(),
        });
        CommandReply::VolumeSet { percent }
    }

    fn now_playing(&self) -> JukeboxResult<CommandReply> {
        self.queue
            .peek_front()
            .cloned()
            .map(|track| CommandReply::NowPlaying {
                state: self.state,
                track,
            })
            .ok_or_else(|| JukeboxError::SessionNotFound(self.session_id.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sink events and transitions
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_sink_event(&mut self, event: SinkEvent) -> Step {
        let is_current = self.active.is_some_and(|r| r.id == event.resource_id);
        if !is_current {
            log::debug!(
                "[Controller] Session {}: ignoring stale {:?} for resource {}",
                self.session_id,
                event.status,
                event.resource_id
            );
            return None;
        }

        match event.status {
            PlayerStatus::Playing => {
                self.state = PlaybackState::Playing;
                None
            }
            PlayerStatus::Paused => {
                self.state = PlaybackState::Paused;
                None
            }
            PlayerStatus::Idle => {
                self.active = None;
                self.finish_head()
            }
            PlayerStatus::Error(error) => {
                log::warn!(
                    "[Controller] Session {}: sink error on resource {}: {}",
                    self.session_id,
                    event.resource_id,
                    error
                );
                self.active = None;
                if let Some(track) = self.queue.pop_front() {
                    self.emitter.emit_playback(PlaybackEvent::TrackFailed {
                        session_id: self.session_id.clone(),
                        track,
                        error,
                        timestamp: now_millis(),
                    });
                }
                self.advance()
            }
        }
    }

    /// Removes the head after it finished or was skipped and moves on.
    fn finish_head(&mut self) -> Step {
        if let Some(track) = self.queue.pop_front() {
            log::info!(
                "[Controller] Session {}: finished \"{}\"",
                self.session_id,
                track.title
            );
            self.emitter.emit_playback(PlaybackEvent::TrackFinished {
                session_id: self.session_id.clone(),
                track,
                timestamp: now_millis(),
            });
        }
        self.advance()
    }

    fn advance(&mut self) -> Step {
        if self.queue.is_empty() {
            self.state = PlaybackState::Idle;
            Some(EndReason::QueueExhausted)
        } else {
            self.state = PlaybackState::Loading;
            None
        }
    }

    fn start_playback(&mut self, track: Track, opened: OpenedStream) -> Step {
        let sink = &self.collaborators.sink;
        let resource = sink.create_resource(opened, self.queue.volume());
        if let Err(e) = sink.play(&self.player, &resource) {
            return self.drop_failed_head(e.into());
        }
        sink.subscribe(&self.transport, &self.player);

        self.active = Some(resource);
        self.state = PlaybackState::Playing;
        self.consecutive_failures = 0;

        log::info!(
            "[Controller] Session {}: now playing \"{}\"",
            self.session_id,
            track.title
        );
        self.emitter.emit_playback(PlaybackEvent::NowPlaying {
            session_id: self.session_id.clone(),
            track,
            timestamp: now_millis(),
        });
        None
    }

    fn drop_failed_head(&mut self, error: JukeboxError) -> Step {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if let Some(track) = self.queue.pop_front() {
            log::warn!(
                "[Controller] Session {}: dropping \"{}\": {}",
                self.session_id,
                track.title,
                error
            );
            self.emitter.emit_playback(PlaybackEvent::TrackFailed {
                session_id: self.session_id.clone(),
                track,
                error: error.to_string(),
                timestamp: now_millis(),
            });
        }
        self.advance()
    }

    async fn teardown(&mut self, reason: EndReason) {
        self.queue.clear();
        self.active = None;
        let sink = Arc::clone(&self.collaborators.sink);
        sink.stop(&self.player);
        sink.disconnect(&self.transport).await;

        self.slot.release();
        self.state = match reason {
            EndReason::QueueExhausted => PlaybackState::Idle,
            _ => PlaybackState::Stopped,
        };
        log::info!(
            "[Controller] Session {} ended ({:?})",
            self.session_id,
            reason
        );
        self.emitter.emit_session(SessionEvent::Ended {
            session_id: self.session_id.clone(),
            reason,
            timestamp: now_millis(),
        });

        // Closing the inbox is what a waiting stop observes.
        self.inbox.close();
        while let Ok(msg) = self.inbox.try_recv() {
            let _ = msg
                .reply
                .send(Err(JukeboxError::SessionEnded(self.session_id.to_string())));
        }
    }
}

/// Resolves (when needed) and opens the stream for `track`.
///
/// Any failure, including running past `timeout`, means the track is dropped;
/// there is no per-track retry.
pub(crate) async fn acquire_stream(
    resolver: Arc<dyn TrackResolver>,
    provider: Arc<dyn StreamProvider>,
    track: Track,
    timeout: Duration,
) -> JukeboxResult<OpenedStream> {
    let attempt = async move {
        let playable = if track.is_direct() {
            track
        } else {
            resolver
                .resolve(&track.title, track.hint())
                .await?
                .ok_or_else(|| {
                    JukeboxError::ResolutionFailed(format!(
                        "no match for \"{}\"",
                        track.resolution_query()
                    ))
                })?
        };
        Ok::<_, JukeboxError>(provider.open(&playable.locator).await?)
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(StreamError::Timeout(timeout.as_secs()).into()),
    }
}
