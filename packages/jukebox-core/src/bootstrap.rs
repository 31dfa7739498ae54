//! Application bootstrap and dependency wiring.
//!
//! This is the composition root: the one place where the event bridge,
//! session registry and command service are created and wired to the
//! collaborators supplied by the embedder.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::api::AppState;
use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::error::{JukeboxError, JukeboxResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge, EventEmitter};
use crate::runtime::TokioSpawner;
use crate::services::{Jukebox, SessionRegistry};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Command service; the entry point for every command source.
    pub jukebox: Arc<Jukebox>,
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// Event bridge feeding WebSocket clients and an optional external emitter.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Broadcast channel sender for real-time events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
}

impl BootstrappedServices {
    /// Builds the API state around these services.
    pub fn app_state(&self, config: Config) -> AppState {
        AppState::new(Arc::clone(&self.jukebox), self.broadcast_tx.clone(), config)
    }

    /// Stops every session and releases their transports.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        let sessions = self.registry.len();
        self.registry.clear_all().await;
        log::info!("[Bootstrap] Stopped {} session(s)", sessions);
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all services around the given collaborators.
///
/// Must be called from within a Tokio runtime; session workers are spawned
/// on it.
///
/// # Errors
///
/// Returns [`JukeboxError::Configuration`] if `config` is invalid.
pub fn bootstrap_services(
    config: &Config,
    collaborators: Collaborators,
) -> JukeboxResult<BootstrappedServices> {
    config.validate().map_err(JukeboxError::Configuration)?;

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    let broadcast_tx = event_bridge.sender().clone();

    let registry = Arc::new(SessionRegistry::new(
        collaborators.clone(),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        config.controller.clone(),
        TokioSpawner::current(),
    ));
    let jukebox = Arc::new(Jukebox::new(Arc::clone(&registry), collaborators));

    Ok(BootstrappedServices {
        jukebox,
        registry,
        event_bridge,
        broadcast_tx,
    })
}
