//! HTTP/WebSocket command surface.
//!
//! Handlers are thin: every command goes through [`Jukebox::execute`] and
//! every live notification comes off the event bridge's broadcast channel.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::events::BroadcastEvent;
use crate::services::Jukebox;

pub mod http;
pub mod response;
pub mod ws;

/// Ports tried when no fixed port is configured.
const PORT_RANGE: (u16, u16) = (49500, 49510);

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// Command service.
    pub jukebox: Arc<Jukebox>,
    /// Broadcast channel sender for real-time events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
}

impl AppState {
    pub fn new(
        jukebox: Arc<Jukebox>,
        broadcast_tx: broadcast::Sender<BroadcastEvent>,
        config: Config,
    ) -> Self {
        Self {
            jukebox,
            broadcast_tx,
            config: Arc::new(RwLock::new(config)),
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
///
/// Runs until `shutdown` resolves.
pub async fn start_server(
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(PORT_RANGE.0, PORT_RANGE.1).await?
    };

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
