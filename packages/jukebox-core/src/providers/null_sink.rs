//! Audio sink that renders nothing.
//!
//! Each playing resource is drained by a background task at network speed,
//! which is enough to drive the full player lifecycle (playing, paused,
//! finished, failed) without a voice backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::collaborators::{
    AudioByteStream, AudioSink, OpenedStream, PlayerHandle, PlayerStatus, ResourceHandle,
    SinkEvent, TransportHandle,
};
use crate::error::{SinkError, SinkResult};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::track::SessionId;

struct PendingResource {
    stream: AudioByteStream,
    volume: f32,
}

struct ActiveResource {
    id: u64,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
}

struct PlayerSlot {
    session_id: SessionId,
    /// Transport the player is routed into; disconnecting it removes the player.
    transport: Option<u64>,
    events: mpsc::UnboundedSender<SinkEvent>,
    active: Option<ActiveResource>,
}

impl PlayerSlot {
    fn send(&self, resource_id: u64, status: PlayerStatus) {
        if self
            .events
            .send(SinkEvent {
                resource_id,
                status,
            })
            .is_err()
        {
            log::trace!("[Sink] Player for {} has no listener", self.session_id);
        }
    }
}

pub struct NullAudioSink {
    spawner: TokioSpawner,
    next_id: AtomicU64,
    players: DashMap<u64, PlayerSlot>,
    /// Streams are not `Sync`, so resources wait here behind a lock.
    pending: Mutex<HashMap<u64, PendingResource>>,
    volumes: DashMap<u64, f32>,
}

impl NullAudioSink {
    pub fn new(spawner: TokioSpawner) -> Self {
        Self {
            spawner,
            next_id: AtomicU64::new(1),
            players: DashMap::new(),
            pending: Mutex::new(HashMap::new()),
            volumes: DashMap::new(),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Current gain of a live resource.
    pub fn volume_of(&self, resource: &ResourceHandle) -> Option<f32> {
        self.volumes.get(&resource.id).map(|v| *v)
    }
}

/// Drains `stream` until it ends, fails or is cancelled, then reports the
/// resource idle. Draining halts while `paused` holds `true`.
async fn drain(
    resource_id: u64,
    mut stream: AudioByteStream,
    events: mpsc::UnboundedSender<SinkEvent>,
    cancel: CancellationToken,
    mut paused: watch::Receiver<bool>,
) {
    let mut total = 0usize;
    let outcome: Result<(), String> = loop {
        let is_paused = *paused.borrow_and_update();
        if is_paused {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                changed = paused.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
            }
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            _ = paused.changed() => {}
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => total += bytes.len(),
                Some(Err(e)) => break Err(e.to_string()),
                None => break Ok(()),
            },
        }
    };
    // Marks the resource finished for pause/unpause.
    cancel.cancel();

    log::debug!(
        "[Sink] Resource {} done after {} bytes ({:?})",
        resource_id,
        total,
        outcome
    );
    if let Err(error) = outcome {
        let _ = events.send(SinkEvent {
            resource_id,
            status: PlayerStatus::Error(error),
        });
    }
    let _ = events.send(SinkEvent {
        resource_id,
        status: PlayerStatus::Idle,
    });
}

#[async_trait]
impl AudioSink for NullAudioSink {
    async fn connect(&self, session_id: &SessionId, channel: &str) -> SinkResult<TransportHandle> {
        if channel.trim().is_empty() {
            return Err(SinkError::Connect("empty channel".into()));
        }
        let id = self.next_id();
        log::info!("[Sink] Session {} joined channel {}", session_id, channel);
        Ok(TransportHandle {
            id,
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
        self.players.insert(
            id,
            PlayerSlot {
                session_id: session_id.clone(),
                transport: None,
                events,
                active: None,
            },
        );
        Ok(PlayerHandle { id })
    }

    fn create_resource(&self, stream: OpenedStream, volume: f32) -> ResourceHandle {
        let id = self.next_id();
        log::debug!("[Sink] Resource {} ({:?}) at gain {}", id, stream.kind, volume);
        self.pending.lock().insert(
            id,
            PendingResource {
                stream: stream.stream,
                volume,
            },
        );
        ResourceHandle { id }
    }

    fn play(&self, player: &PlayerHandle, resource: &ResourceHandle) -> SinkResult<()> {
        let pending = self
            .pending
            .lock()
            .remove(&resource.id)
            .ok_or_else(|| SinkError::Player(format!("unknown resource {}", resource.id)))?;
        let mut slot = self
            .players
            .get_mut(&player.id)
            .ok_or_else(|| SinkError::Player(format!("unknown player {}", player.id)))?;

        if let Some(previous) = slot.active.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);
        self.volumes.insert(resource.id, pending.volume);
        slot.active = Some(ActiveResource {
            id: resource.id,
            cancel: cancel.clone(),
            paused: paused_tx,
        });
        slot.send(resource.id, PlayerStatus::Playing);

        self.spawner.spawn(drain(
            resource.id,
            pending.stream,
            slot.events.clone(),
            cancel,
            paused_rx,
        ));
        Ok(())
    }

    fn pause(&self, player: &PlayerHandle) -> bool {
        let Some(slot) = self.players.get(&player.id) else {
            return false;
        };
        let Some(active) = &slot.active else {
            return false;
        };
        if active.cancel.is_cancelled() || *active.paused.borrow() {
            return false;
        }
        active.paused.send_replace(true);
        slot.send(active.id, PlayerStatus::Paused);
        true
    }

    fn unpause(&self, player: &PlayerHandle) -> bool {
        let Some(slot) = self.players.get(&player.id) else {
            return false;
        };
        let Some(active) = &slot.active else {
            return false;
        };
        if active.cancel.is_cancelled() || !*active.paused.borrow() {
            return false;
        }
        active.paused.send_replace(false);
        slot.send(active.id, PlayerStatus::Playing);
        true
    }

    fn stop(&self, player: &PlayerHandle) {
        if let Some(mut slot) = self.players.get_mut(&player.id) {
            if let Some(active) = slot.active.take() {
                active.cancel.cancel();
                self.volumes.remove(&active.id);
            }
        }
    }

    fn set_volume(&self, resource: &ResourceHandle, volume: f32) {
        if let Some(mut gain) = self.volumes.get_mut(&resource.id) {
            *gain = volume;
            log::debug!("[Sink] Resource {} gain -> {}", resource.id, volume);
        }
    }

    fn subscribe(&self, transport: &TransportHandle, player: &PlayerHandle) {
        if let Some(mut slot) = self.players.get_mut(&player.id) {
            slot.transport = Some(transport.id);
        }
        log::trace!(
            "[Sink] Player {} routed into transport {}",
            player.id,
            transport.id
        );
    }

    async fn disconnect(&self, transport: &TransportHandle) {
        // Only players of this transport go; a successor session with the
        // same id keeps its own.
        self.players.retain(|_, slot| {
            if slot.transport != Some(transport.id) {
                return true;
            }
            if let Some(active) = slot.active.take() {
                active.cancel.cancel();
                self.volumes.remove(&active.id);
            }
            false
        });
        log::info!(
            "[Sink] Session {} left channel {}",
            transport.session_id,
            transport.channel
        );
    }
}
