//! Core configuration types.
//!
//! All fields have defaults so a config file only needs to list what it
//! changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::volume::{MAX_VOLUME_PERCENT, MIN_VOLUME_PERCENT};

/// Tuning for per-session playback controllers.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ControllerConfig {
    /// Capacity of each session's command inbox.
    pub inbox_capacity: usize,

    /// Upper bound for resolving and opening one track's stream (seconds).
    pub acquisition_timeout_secs: u64,

    /// Consecutive acquisition failures tolerated before backing off.
    /// `0` disables backoff.
    pub failure_backoff_threshold: u32,

    /// First backoff delay once the threshold is reached (milliseconds).
    pub failure_backoff_initial_ms: u64,

    /// Cap for the doubling backoff delay (milliseconds).
    pub failure_backoff_max_ms: u64,

    /// How long a stop waits for the worker to tear down (milliseconds).
    pub stop_timeout_ms: u64,

    /// Volume of a new session, in percent (1-100).
    pub default_volume_percent: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 32,
            acquisition_timeout_secs: 30,
            failure_backoff_threshold: 3,
            failure_backoff_initial_ms: 500,
            failure_backoff_max_ms: 5_000,
            stop_timeout_ms: 2_000,
            default_volume_percent: 50,
        }
    }
}

impl ControllerConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.inbox_capacity == 0 {
            return Err("inbox_capacity must be >= 1 (mpsc::channel panics on 0)".to_string());
        }
        if self.acquisition_timeout_secs == 0 {
            return Err("acquisition_timeout_secs must be >= 1".to_string());
        }
        if self.failure_backoff_max_ms < self.failure_backoff_initial_ms {
            return Err(
                "failure_backoff_max_ms must be >= failure_backoff_initial_ms".to_string(),
            );
        }
        let pct = i64::from(self.default_volume_percent);
        if !(MIN_VOLUME_PERCENT..=MAX_VOLUME_PERCENT).contains(&pct) {
            return Err("default_volume_percent must be within 1-100".to_string());
        }
        Ok(())
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_secs(self.acquisition_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn default_volume(&self) -> f32 {
        f32::from(self.default_volume_percent) / 100.0
    }

    /// Delay before the next acquisition attempt after `consecutive_failures`
    /// failures in a row, or `None` when no delay applies.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Option<Duration> {
        if self.failure_backoff_threshold == 0
            || consecutive_failures < self.failure_backoff_threshold
            || self.failure_backoff_initial_ms == 0
        {
            return None;
        }
        let doublings = (consecutive_failures - self.failure_backoff_threshold).min(16);
        let delay = self
            .failure_backoff_initial_ms
            .saturating_mul(1u64 << doublings)
            .min(self.failure_backoff_max_ms);
        Some(Duration::from_millis(delay))
    }
}

/// Configuration for the jukebox service.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Port for the HTTP/WS command surface (0 = auto-allocate).
    pub preferred_port: u16,

    /// Capacity of the broadcast channel feeding WebSocket listeners.
    pub event_channel_capacity: usize,

    /// Origin prefixes allowed to call the API from a browser.
    pub trusted_origins: Vec<String>,

    /// Per-session controller tuning.
    pub controller: ControllerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 49500,
            event_channel_capacity: 256,
            trusted_origins: vec![
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
            ],
            controller: ControllerConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)"
                    .to_string(),
            );
        }
        self.controller.validate()
    }
}
