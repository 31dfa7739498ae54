//! Event emitter abstraction for decoupling session workers from transport.
//!
//! Workers depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, so tests can record events and the server can fan them out.

use super::{PlaybackEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a playback notification.
    fn emit_playback(&self, event: PlaybackEvent);

    /// Emits a session lifecycle event.
    fn emit_session(&self, event: SessionEvent);
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }

    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::events::EndReason;
    use crate::track::{SessionId, Track};

    struct CountingEventEmitter {
        playback_count: AtomicUsize,
        session_count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_playback(&self, _event: PlaybackEvent) {
            self.playback_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_session(&self, _event: SessionEvent) {
            self.session_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn emitter_is_usable_as_trait_object() {
        let counting = Arc::new(CountingEventEmitter {
            playback_count: AtomicUsize::new(0),
            session_count: AtomicUsize::new(0),
        });
        let emitter: Arc<dyn EventEmitter> = counting.clone();

        emitter.emit_playback(PlaybackEvent::NowPlaying {
            session_id: SessionId::from("g1"),
            track: Track::direct("A", "http://x/a"),
            timestamp: 0,
        });
        emitter.emit_session(SessionEvent::Ended {
            session_id: SessionId::from("g1"),
            reason: EndReason::Stopped,
            timestamp: 0,
        });

        assert_eq!(counting.playback_count.load(Ordering::SeqCst), 1);
        assert_eq!(counting.session_count.load(Ordering::SeqCst), 1);
    }
}
