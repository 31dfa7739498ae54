//! Bridge implementation that maps domain events to broadcast transport.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, PlaybackEvent, SessionEvent};

/// Forwards domain events to a `tokio::sync::broadcast` channel that
/// WebSocket handlers subscribe to, and optionally to an external emitter
/// (e.g. a chat front-end that renders "now playing" messages).
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter. Can be called after construction.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> &broadcast::Sender<BroadcastEvent> {
        &self.tx
    }
}

macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_playback, PlaybackEvent, Playback);
    impl_emit!(emit_session, SessionEvent, Session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EndReason;
    use crate::track::SessionId;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();

        bridge.emit_session(SessionEvent::Ended {
            session_id: SessionId::from("g1"),
            reason: EndReason::Stopped,
            timestamp: 1,
        });

        match rx.recv().await.unwrap() {
            BroadcastEvent::Session(SessionEvent::Ended { reason, .. }) => {
                assert_eq!(reason, EndReason::Stopped)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emitting_without_receivers_does_not_fail() {
        let bridge = BroadcastEventBridge::new(1);
        bridge.emit_playback(PlaybackEvent::Paused {
            session_id: SessionId::from("g1"),
            timestamp: 0,
        });
    }
}
