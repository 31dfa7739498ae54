//! HTTP stream provider.
//!
//! Opens tracks by streaming a GET of their locator. Links are classified
//! by scheme: `http(s)` URLs stream directly, `catalog:` links name
//! catalogue items, anything else is search text.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::collaborators::{OpenedStream, StreamKind, StreamProvider};
use crate::error::{StreamError, StreamResult};
use crate::providers::catalog::CATALOG_SCHEME;
use crate::track::{QueryKind, Track};

/// Timeout for establishing a connection to a media host.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Creates the shared client used for media requests.
///
/// Only the connect phase is bounded; a whole-request timeout would cut
/// long tracks off mid-stream.
pub fn create_media_client() -> StreamResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(StreamError::from)
}

fn is_http_url(query: &str) -> bool {
    let lower = query.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Title for a bare URL: its last non-empty path segment, else its host.
fn title_from_url(locator: &str) -> String {
    let without_query = locator.split(['?', '#']).next().unwrap_or(locator);
    let rest = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let host = segments.next().unwrap_or(rest);
    segments.last().unwrap_or(host).to_string()
}

#[derive(Clone)]
pub struct HttpStreamProvider {
    client: Client,
}

impl HttpStreamProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamProvider for HttpStreamProvider {
    async fn open(&self, locator: &str) -> StreamResult<OpenedStream> {
        if !is_http_url(locator) {
            return Err(StreamError::Unsupported(locator.to_string()));
        }

        log::debug!("[Stream] GET {}", locator);
        let response = self.client.get(locator).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::HttpStatus(status.as_u16(), locator.to_string()));
        }

        let kind = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(StreamKind::Arbitrary, StreamKind::from_mime);
        log::info!("[Stream] Opened {} as {:?}", locator, kind);

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(OpenedStream {
            stream: Box::pin(stream),
            kind,
        })
    }

    fn validate_kind(&self, query: &str) -> QueryKind {
        let query = query.trim();
        if query.is_empty() {
            QueryKind::Unrecognized
        } else if is_http_url(query) {
            QueryKind::DirectVideo
        } else if query.starts_with(CATALOG_SCHEME) {
            QueryKind::DirectPlaylistItem
        } else {
            QueryKind::NeedsResolution
        }
    }

    async fn describe(&self, locator: &str) -> StreamResult<Track> {
        if !is_http_url(locator) {
            return Err(StreamError::Unsupported(locator.to_string()));
        }
        Ok(Track::direct(title_from_url(locator), locator))
    }
}
