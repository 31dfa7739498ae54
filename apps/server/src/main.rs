//! Jukebox Server - standalone host for the jukebox core.
//!
//! Serves the HTTP/WebSocket command surface over the reference
//! collaborators: a YAML catalogue for lookups, HTTP streaming for audio and
//! a sink that drains streams without rendering them.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jukebox_core::providers::{
    create_media_client, CatalogResolver, HttpStreamProvider, NullAudioSink,
};
use jukebox_core::{
    bootstrap_services, start_server, Collaborators, LoggingEventEmitter, TokioSpawner,
};
use tokio::signal;
use tokio::sync::watch;

use crate::config::ServerConfig;

/// Jukebox Server - per-session music queues behind an HTTP/WebSocket API.
#[derive(Parser, Debug)]
#[command(name = "jukebox-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "JUKEBOX_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "JUKEBOX_BIND_PORT")]
    port: Option<u16>,

    /// Catalogue file (overrides config file).
    #[arg(long, value_name = "FILE", env = "JUKEBOX_CATALOG")]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Jukebox Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(catalog) = args.catalog {
        config.catalog = Some(catalog);
    }
    log::info!(
        "Configuration: bind_port={}, catalog={:?}",
        config.bind_port,
        config.catalog
    );

    let resolver = match config.catalog {
        Some(ref path) => CatalogResolver::load(path).context("Failed to load catalogue")?,
        None => {
            log::warn!("No catalogue configured - only direct links will resolve");
            CatalogResolver::default()
        }
    };
    let client = create_media_client().context("Failed to create HTTP client")?;
    let collaborators = Collaborators::new(
        Arc::new(resolver),
        Arc::new(HttpStreamProvider::new(client)),
        Arc::new(NullAudioSink::new(TokioSpawner::current())),
    );

    // Bootstrap services
    let core_config = config.to_core_config();
    let services =
        bootstrap_services(&core_config, collaborators).context("Failed to bootstrap services")?;
    services
        .event_bridge
        .set_external_emitter(Arc::new(LoggingEventEmitter));

    log::info!("Services bootstrapped successfully");

    let app_state = services.app_state(core_config);
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server_handle = tokio::spawn(async move {
        let stopped = async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        };
        if let Err(e) = start_server(app_state, stopped).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Stop sessions first so their transports are released, then the listener.
    services.shutdown().await;
    let _ = stop_tx.send(true);
    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
