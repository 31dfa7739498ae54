//! Test doubles shared by the service tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::collaborators::{
    AudioSink, Collaborators, OpenedStream, PlayerHandle, PlayerStatus, ResourceHandle, SinkEvent,
    StreamKind, StreamProvider, TrackResolver, TransportHandle,
};
use crate::command::{Command, CommandKind, CommandReply};
use crate::config::ControllerConfig;
use crate::error::{
    JukeboxResult, ResolveError, ResolveResult, SinkResult, StreamError, StreamResult,
};
use crate::events::{BroadcastEvent, EndReason, EventEmitter, PlaybackEvent, SessionEvent};
use crate::queue::QueueSnapshot;
use crate::runtime::TokioSpawner;
use crate::services::{Jukebox, SessionRegistry};
use crate::track::{QueryKind, SessionId, Track};

/// Polls `cond` until it holds, failing the test after ten seconds.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MockResolver {
    matches: Mutex<HashMap<String, Track>>,
    items: Mutex<HashMap<String, Track>>,
    queries: Mutex<Vec<(String, Option<String>)>>,
}

impl MockResolver {
    /// `resolve(title, _)` returns `track`.
    pub fn add_match(&self, title: &str, track: Track) {
        self.matches.lock().insert(title.to_string(), track);
    }

    /// `lookup(locator)` returns `track`.
    pub fn add_item(&self, locator: &str, track: Track) {
        self.items.lock().insert(locator.to_string(), track);
    }

    pub fn queries(&self) -> Vec<(String, Option<String>)> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl TrackResolver for MockResolver {
    async fn resolve(&self, title: &str, hint: Option<&str>) -> ResolveResult<Option<Track>> {
        self.queries
            .lock()
            .push((title.to_string(), hint.map(str::to_string)));
        Ok(self.matches.lock().get(title).cloned())
    }

    async fn lookup(&self, locator: &str) -> ResolveResult<Track> {
        self.items
            .lock()
            .get(locator)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownItem(locator.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Opens empty streams. Locators can be made to fail or hang, and all opens
/// can be held back until [`MockProvider::release`].
pub(crate) struct MockProvider {
    failing: Mutex<HashSet<String>>,
    blocked: Mutex<HashSet<String>>,
    opened: Mutex<Vec<String>>,
    gate: watch::Sender<bool>,
}

impl Default for MockProvider {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            failing: Mutex::default(),
            blocked: Mutex::default(),
            opened: Mutex::default(),
            gate,
        }
    }
}

impl MockProvider {
    pub fn fail(&self, locator: &str) {
        self.failing.lock().insert(locator.to_string());
    }

    /// Opens of `locator` never complete.
    pub fn block(&self, locator: &str) {
        self.blocked.lock().insert(locator.to_string());
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Locators passed to `open`, in call order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl StreamProvider for MockProvider {
    async fn open(&self, locator: &str) -> StreamResult<OpenedStream> {
        self.opened.lock().push(locator.to_string());

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(StreamError::Http("gate closed".into()));
        }
        if self.blocked.lock().contains(locator) {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().contains(locator) {
            return Err(StreamError::HttpStatus(404, locator.to_string()));
        }
        Ok(OpenedStream {
            stream: Box::pin(futures::stream::empty::<Result<bytes::Bytes, std::io::Error>>()),
            kind: StreamKind::Mpeg,
        })
    }

    fn validate_kind(&self, query: &str) -> QueryKind {
        let query = query.trim();
        if query.starts_with("http://") || query.starts_with("https://") {
            QueryKind::DirectVideo
        } else if query.starts_with("catalog:") {
            QueryKind::DirectPlaylistItem
        } else if query.is_empty() {
            QueryKind::Unrecognized
        } else {
            QueryKind::NeedsResolution
        }
    }

    async fn describe(&self, locator: &str) -> StreamResult<Track> {
        let title = locator.rsplit('/').next().unwrap_or(locator);
        Ok(Track::direct(title, locator))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sink
// ─────────────────────────────────────────────────────────────────────────────

struct MockPlayer {
    events: mpsc::UnboundedSender<SinkEvent>,
    current: Option<u64>,
    paused: bool,
}

impl MockPlayer {
    fn send(&self, resource_id: u64, status: PlayerStatus) {
        let _ = self.events.send(SinkEvent {
            resource_id,
            status,
        });
    }
}

/// Records every call and reports player status like a real sink would.
#[derive(Default)]
pub(crate) struct MockSink {
    next_id: AtomicU64,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    players: Mutex<HashMap<u64, MockPlayer>>,
    session_players: Mutex<HashMap<SessionId, u64>>,
    volumes: Mutex<HashMap<u64, f32>>,
}

impl MockSink {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn with_session_player<R>(
        &self,
        session: &str,
        f: impl FnOnce(&mut MockPlayer) -> R,
    ) -> Option<R> {
        let player_id = *self.session_players.lock().get(&SessionId::from(session))?;
        self.players.lock().get_mut(&player_id).map(f)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Resource currently loaded in the session's player.
    pub fn current_resource(&self, session: &str) -> Option<u64> {
        self.with_session_player(session, |p| p.current).flatten()
    }

    pub fn resource_volume(&self, resource_id: u64) -> Option<f32> {
        self.volumes.lock().get(&resource_id).copied()
    }

    /// The current resource plays to its end.
    pub fn finish(&self, session: &str) {
        self.with_session_player(session, |p| {
            if let Some(resource) = p.current.take() {
                p.paused = false;
                p.send(resource, PlayerStatus::Idle);
            }
        });
    }

    /// The current resource fails while rendering.
    pub fn fail(&self, session: &str, error: &str) {
        self.with_session_player(session, |p| {
            if let Some(resource) = p.current.take() {
                p.paused = false;
                p.send(resource, PlayerStatus::Error(error.to_string()));
                p.send(resource, PlayerStatus::Idle);
            }
        });
    }

    pub fn send_raw(&self, session: &str, event: SinkEvent) {
        self.with_session_player(session, |p| {
            let _ = p.events.send(event);
        });
    }
}

#[async_trait]
impl AudioSink for MockSink {
    async fn connect(&self, session_id: &SessionId, channel: &str) -> SinkResult<TransportHandle> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(TransportHandle {
            id: self.next_id(),
            session_id: session_id.clone(),
            channel: channel.to_string(),
        })
    }

    fn create_player(
        &self,
        session_id: &SessionId,
        events: mpsc::UnboundedSender<SinkEvent>,
    ) -> SinkResult<PlayerHandle> {
        let id = self.next_id();
        self.players.lock().insert(
            id,
            MockPlayer {
                events,
                current: None,
                paused: false,
            },
        );
        self.session_players.lock().insert(session_id.clone(), id);
        Ok(PlayerHandle { id })
    }

    fn create_resource(&self, _stream: OpenedStream, volume: f32) -> ResourceHandle {
        let id = self.next_id();
        self.volumes.lock().insert(id, volume);
        ResourceHandle { id }
    }

    fn play(&self, player: &PlayerHandle, resource: &ResourceHandle) -> SinkResult<()> {
        if let Some(p) = self.players.lock().get_mut(&player.id) {
            p.current = Some(resource.id);
            p.paused = false;
            p.send(resource.id, PlayerStatus::Playing);
        }
        Ok(())
    }

    fn pause(&self, player: &PlayerHandle) -> bool {
        let mut players = self.players.lock();
        let Some(p) = players.get_mut(&player.id) else {
            return false;
        };
        match p.current {
            Some(resource) if !p.paused => {
                p.paused = true;
                p.send(resource, PlayerStatus::Paused);
                true
            }
            _ => false,
        }
    }

    fn unpause(&self, player: &PlayerHandle) -> bool {
        let mut players = self.players.lock();
        let Some(p) = players.get_mut(&player.id) else {
            return false;
        };
        match p.current {
            Some(resource) if p.paused => {
                p.paused = false;
                p.send(resource, PlayerStatus::Playing);
                true
            }
            _ => false,
        }
    }

    fn stop(&self, player: &PlayerHandle) {
        if let Some(p) = self.players.lock().get_mut(&player.id) {
            if let Some(resource) = p.current.take() {
                p.paused = false;
                p.send(resource, PlayerStatus::Idle);
            }
        }
    }

    fn set_volume(&self, resource: &ResourceHandle, volume: f32) {
        self.volumes.lock().insert(resource.id, volume);
    }

    fn subscribe(&self, _transport: &TransportHandle, _player: &PlayerHandle) {}

    async fn disconnect(&self, _transport: &TransportHandle) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emitter
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct RecordingEmitter {
    events: Mutex<Vec<BroadcastEvent>>,
}

impl RecordingEmitter {
    pub fn now_playing_titles(&self) -> Vec<String> {
        self.playback_titles(|e| match e {
            PlaybackEvent::NowPlaying { track, .. } => Some(track),
            _ => None,
        })
    }

    pub fn failed_titles(&self) -> Vec<String> {
        self.playback_titles(|e| match e {
            PlaybackEvent::TrackFailed { track, .. } => Some(track),
            _ => None,
        })
    }

    pub fn ended_reasons(&self) -> Vec<EndReason> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BroadcastEvent::Session(SessionEvent::Ended { reason, .. }) => Some(*reason),
                _ => None,
            })
            .collect()
    }

    fn playback_titles(&self, pick: impl Fn(&PlaybackEvent) -> Option<&Track>) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BroadcastEvent::Playback(p) => pick(p).map(|t| t.title.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        self.events.lock().push(event.into());
    }

    fn emit_session(&self, event: SessionEvent) {
        self.events.lock().push(event.into());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixture
// ─────────────────────────────────────────────────────────────────────────────

/// A jukebox wired to mocks. Must be built inside a Tokio runtime.
pub(crate) struct Fixture {
    pub resolver: Arc<MockResolver>,
    pub provider: Arc<MockProvider>,
    pub sink: Arc<MockSink>,
    pub emitter: Arc<RecordingEmitter>,
    pub registry: Arc<SessionRegistry>,
    pub jukebox: Arc<Jukebox>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let resolver = Arc::new(MockResolver::default());
        let provider = Arc::new(MockProvider::default());
        let sink = Arc::new(MockSink::default());
        let emitter = Arc::new(RecordingEmitter::default());
        let collaborators = Collaborators::new(resolver.clone(), provider.clone(), sink.clone());
        let registry = Arc::new(SessionRegistry::new(
            collaborators.clone(),
            emitter.clone(),
            config,
            TokioSpawner::current(),
        ));
        let jukebox = Arc::new(Jukebox::new(Arc::clone(&registry), collaborators));
        Self {
            resolver,
            provider,
            sink,
            emitter,
            registry,
            jukebox,
        }
    }

    /// Runs `kind` for `session` as a requester sitting in a voice channel.
    pub async fn execute(&self, session: &str, kind: CommandKind) -> JukeboxResult<CommandReply> {
        self.jukebox
            .execute(Command::new(session, kind).in_channel("voice-1"))
            .await
    }

    pub async fn enqueue(&self, session: &str, query: &str) -> JukeboxResult<CommandReply> {
        self.execute(
            session,
            CommandKind::Enqueue {
                query: query.to_string(),
            },
        )
        .await
    }

    pub async fn set_volume(&self, session: &str, percent: i64) -> JukeboxResult<CommandReply> {
        self.execute(session, CommandKind::SetVolume { percent })
            .await
    }

    pub async fn list_queue(&self, session: &str) -> QueueSnapshot {
        match self.execute(session, CommandKind::ListQueue).await {
            Ok(CommandReply::Queue { queue, .. }) => queue,
            other => panic!("unexpected list reply: {other:?}"),
        }
    }
}
