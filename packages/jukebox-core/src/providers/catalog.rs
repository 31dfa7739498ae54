//! Catalogue-backed track resolver.
//!
//! Stands in for a music-service lookup. Entries are loaded from a YAML file:
//!
//! ```yaml
//! items:
//!   - id: "42"
//!     title: "One More Time"
//!     artist: "Daft Punk"
//!     url: "https://media.example.com/one-more-time.mp3"
//! ```
//!
//! `catalog:42` then names the entry as a playlist item, and free text is
//! matched against every entry's title and artist.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::collaborators::TrackResolver;
use crate::error::{JukeboxError, JukeboxResult, ResolveError, ResolveResult};
use crate::track::Track;
use crate::utils::words;

/// Locator prefix for catalogue items.
pub const CATALOG_SCHEME: &str = "catalog:";

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    /// Directly streamable location of the audio.
    pub url: String,
}

impl CatalogEntry {
    fn locator(&self) -> String {
        format!("{CATALOG_SCHEME}{}", self.id)
    }

    fn score(&self, query: &HashSet<String>) -> usize {
        let haystack: HashSet<String> = words(&self.title).chain(words(&self.artist)).collect();
        query.iter().filter(|w| haystack.contains(*w)).count()
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<CatalogEntry>,
}

/// Resolves queries against an in-memory catalogue.
#[derive(Debug, Default)]
pub struct CatalogResolver {
    entries: Vec<CatalogEntry>,
}

impl CatalogResolver {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parses a catalogue from YAML text.
    pub fn from_yaml(yaml: &str) -> JukeboxResult<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)
            .map_err(|e| JukeboxError::Configuration(format!("invalid catalogue: {e}")))?;
        Ok(Self::new(file.items))
    }

    /// Loads a catalogue file.
    pub fn load(path: &Path) -> JukeboxResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            JukeboxError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let resolver = Self::from_yaml(&content)?;
        log::info!(
            "[Catalog] Loaded {} entries from {}",
            resolver.len(),
            path.display()
        );
        Ok(resolver)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry sharing the most words with the query; ties go to the earlier
    /// entry and no shared word means no match.
    fn best_match(&self, query: &str) -> Option<&CatalogEntry> {
        let query: HashSet<String> = words(query).collect();
        if query.is_empty() {
            return None;
        }
        let mut best: Option<(&CatalogEntry, usize)> = None;
        for entry in &self.entries {
            let score = entry.score(&query);
            if score > best.map_or(0, |(_, s)| s) {
                best = Some((entry, score));
            }
        }
        best.map(|(entry, _)| entry)
    }
}

#[async_trait]
impl TrackResolver for CatalogResolver {
    async fn resolve(&self, title: &str, hint: Option<&str>) -> ResolveResult<Option<Track>> {
        let query = match hint {
            Some(hint) => format!("{title} {hint}"),
            None => title.to_string(),
        };
        let found = self.best_match(&query);
        log::debug!(
            "[Catalog] \"{}\" -> {:?}",
            query,
            found.map(|e| e.title.as_str())
        );
        Ok(found.map(|entry| Track::direct(entry.title.clone(), entry.url.clone())))
    }

    async fn lookup(&self, locator: &str) -> ResolveResult<Track> {
        let id = locator.strip_prefix(CATALOG_SCHEME).unwrap_or(locator);
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| {
                Track::needs_resolution(entry.title.clone(), entry.locator(), entry.artist.clone())
            })
            .ok_or_else(|| ResolveError::UnknownItem(locator.to_string()))
    }
}
