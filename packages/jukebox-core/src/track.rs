//! Track descriptors and session identifiers.
//!
//! A [`Track`] is produced by the intake step (query classification plus
//! resolution) before it ever reaches a session queue, and never changes
//! afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one group session, supplied by the command source.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How a track's audio is obtained at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// The locator can be opened directly by the stream provider.
    DirectStream,
    /// The locator only identifies metadata; a playable match has to be
    /// found through the track resolver using title and hint.
    NeedsResolution,
}

/// Classification of a raw user query, computed before intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryKind {
    /// A link to a single directly streamable item.
    DirectVideo,
    /// A link to an item in an external catalogue that carries metadata only.
    DirectPlaylistItem,
    /// Free text that has to be searched for.
    NeedsResolution,
    /// Nothing usable.
    Unrecognized,
}

/// A resolved or resolvable piece of audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub title: String,
    pub source_kind: SourceKind,
    pub locator: String,
    /// Extra search terms (usually the artist). Only consulted for
    /// [`SourceKind::NeedsResolution`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_hint: Option<String>,
}

impl Track {
    /// Creates a track that can be streamed from `locator` as-is.
    pub fn direct(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_kind: SourceKind::DirectStream,
            locator: locator.into(),
            resolution_hint: None,
        }
    }

    /// Creates a track that must be resolved to a playable match before
    /// streaming. An empty hint is accepted; resolution may then fail.
    pub fn needs_resolution(
        title: impl Into<String>,
        locator: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            source_kind: SourceKind::NeedsResolution,
            locator: locator.into(),
            resolution_hint: Some(hint.into()),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.source_kind == SourceKind::DirectStream
    }

    /// Returns the hint if it carries any non-whitespace text.
    pub fn hint(&self) -> Option<&str> {
        self.resolution_hint
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    /// Search text used when resolving: `"{title} {hint}"`, or the title alone.
    pub fn resolution_query(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{} {}", self.title, hint),
            None => self.title.clone(),
        }
    }
}
