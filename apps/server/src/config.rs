//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jukebox_core::ControllerConfig;
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port in the default range).
    /// Override: `JUKEBOX_BIND_PORT`
    pub bind_port: u16,

    /// YAML catalogue used to resolve search text and `catalog:` links.
    /// Override: `JUKEBOX_CATALOG`
    pub catalog: Option<PathBuf>,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    /// Origin prefixes allowed to call the API from a browser.
    pub trusted_origins: Vec<String>,

    /// Per-session playback tuning.
    pub controller: ControllerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = jukebox_core::Config::default();
        Self {
            bind_port: core.preferred_port,
            catalog: None,
            event_channel_capacity: core.event_channel_capacity,
            trusted_origins: core.trusted_origins,
            controller: core.controller,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("JUKEBOX_ACQUISITION_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.controller.acquisition_timeout_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("JUKEBOX_DEFAULT_VOLUME") {
            if let Ok(percent) = val.parse() {
                self.controller.default_volume_percent = percent;
            }
        }

        // Note: JUKEBOX_BIND_PORT and JUKEBOX_CATALOG are handled by clap via
        // #[arg(env = ...)] in main.rs
    }

    /// Converts to jukebox-core's Config type.
    pub fn to_core_config(&self) -> jukebox_core::Config {
        jukebox_core::Config {
            preferred_port: self.bind_port,
            event_channel_capacity: self.event_channel_capacity,
            trusted_origins: self.trusted_origins.clone(),
            controller: self.controller.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_uses_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.bind_port, 49500);
        assert!(config.catalog.is_none());
        assert!(config.to_core_config().validate().is_ok());
    }

    #[test]
    fn yaml_overrides_nested_controller_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("jukebox.yaml");
        std::fs::write(
            &path,
            "bind_port: 8080\ncatalog: /srv/catalog.yaml\ncontroller:\n  stop_timeout_ms: 250\n",
        )
        .unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.catalog, Some(PathBuf::from("/srv/catalog.yaml")));
        assert_eq!(config.controller.stop_timeout_ms, 250);
        assert_eq!(config.controller.inbox_capacity, 32);

        let core = config.to_core_config();
        assert_eq!(core.preferred_port, 8080);
        assert_eq!(core.controller.stop_timeout_ms, 250);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(ServerConfig::load(Some(&dir.path().join("nope.yaml"))).is_err());
    }
}
