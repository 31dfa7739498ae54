//! Reference collaborator implementations used by the standalone server.

pub mod catalog;
pub mod http;
pub mod null_sink;

pub use catalog::{CatalogEntry, CatalogResolver};
pub use http::{create_media_client, HttpStreamProvider};
pub use null_sink::NullAudioSink;
