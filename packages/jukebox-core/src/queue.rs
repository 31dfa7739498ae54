//! Ordered playlist and volume state for one session.
//!
//! The queue performs no synchronisation: it is owned by the session's
//! playback controller task, which is its only mutator.

use std::collections::VecDeque;

use serde::Serialize;

use crate::track::Track;
use crate::volume::{clamp_gain, gain_to_percent, DEFAULT_VOLUME};

/// Point-in-time view of a session's playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// The head of the playlist: playing, paused, or still loading.
    pub now_playing: Option<Track>,
    /// Tracks after the head, in play order.
    pub upcoming: Vec<Track>,
    /// Current volume as a percentage.
    pub volume_percent: u8,
}

impl QueueSnapshot {
    /// Total number of tracks including the head.
    pub fn len(&self) -> usize {
        self.upcoming.len() + usize::from(self.now_playing.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.now_playing.is_none()
    }
}

/// Playlist plus session-scoped settings.
#[derive(Debug, Clone)]
pub struct SessionQueue {
    tracks: VecDeque<Track>,
    volume: f32,
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionQueue {
    pub fn new() -> Self {
        Self::with_volume(DEFAULT_VOLUME)
    }

    pub fn with_volume(volume: f32) -> Self {
        Self {
            tracks: VecDeque::new(),
            volume: clamp_gain(volume),
        }
    }

    /// Appends a track and returns the new length.
    ///
    /// A return value of 1 means the track is now the head.
    pub fn enqueue(&mut self, track: Track) -> usize {
        self.tracks.push_back(track);
        self.tracks.len()
    }

    /// Removes and returns the head, or `None` when empty.
    pub fn pop_front(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    pub fn peek_front(&self) -> Option<&Track> {
        self.tracks.front()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Stores a gain, clamped into `[0.0, 1.0]`.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_gain(volume);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.tracks.front().cloned(),
            upcoming: self.tracks.iter().skip(1).cloned().collect(),
            volume_percent: gain_to_percent(self.volume),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str) -> Track {
        Track::direct(title, format!("http://media.local/{title}.mp3"))
    }

    #[test]
    fn enqueue_preserves_fifo_order_and_reports_length() {
        let mut queue = SessionQueue::new();
        assert_eq!(queue.enqueue(track("a")), 1);
        assert_eq!(queue.enqueue(track("b")), 2);
        assert_eq!(queue.enqueue(track("c")), 3);

        let titles: Vec<_> = queue.tracks().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["a", "b", "c"]);
        assert_eq!(queue.pop_front().unwrap().title, "a");
        assert_eq!(queue.peek_front().unwrap().title, "b");
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let mut queue = SessionQueue::new();
        assert!(queue.pop_front().is_none());
        assert!(queue.peek_front().is_none());
    }

    #[test]
    fn clear_drops_tracks_but_keeps_volume() {
        let mut queue = SessionQueue::new();
        queue.set_volume(0.8);
        queue.enqueue(track("a"));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.volume(), 0.8);
    }

    #[test]
    fn default_volume_is_half() {
        assert_eq!(SessionQueue::new().volume(), 0.5);
    }

    #[test]
    fn set_volume_clamps() {
        let mut queue = SessionQueue::new();
        queue.set_volume(1.7);
        assert_eq!(queue.volume(), 1.0);
        queue.set_volume(-1.0);
        assert_eq!(queue.volume(), 0.0);
    }

    #[test]
    fn snapshot_splits_head_from_upcoming() {
        let mut queue = SessionQueue::new();
        queue.enqueue(track("a"));
        queue.enqueue(track("b"));
        let snap = queue.snapshot();
        assert_eq!(snap.now_playing.as_ref().unwrap().title, "a");
        assert_eq!(snap.upcoming.len(), 1);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.volume_percent, 50);
    }
}
