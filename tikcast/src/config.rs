//! Runtime configuration, loaded from environment variables with defaults.

use std::time::Duration;

use webcast::BridgeConnectorConfig;

use crate::api::ApiServerConfig;
use crate::ingest::IngestConfig;
use crate::resolver;
use crate::store::buffer;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP server settings.
    pub api: ApiServerConfig,
    /// Webcast bridge connector settings.
    pub bridge: BridgeConnectorConfig,
    /// Timeout for profile-page fetches during room resolution.
    pub profile_fetch_timeout: Duration,
    /// Ingestion service settings (sweeper cadence, staleness threshold).
    pub ingest: IngestConfig,
    /// Events retained per (handle, kind).
    pub buffer_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiServerConfig::default(),
            bridge: BridgeConnectorConfig::default(),
            profile_fetch_timeout: resolver::DEFAULT_FETCH_TIMEOUT,
            ingest: IngestConfig::default(),
            buffer_capacity: buffer::DEFAULT_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `API_PORT`
    /// - `BRIDGE_ENDPOINT` (e.g. "ws://127.0.0.1:8695/ws")
    /// - `PROFILE_FETCH_TIMEOUT_SECS`
    /// - `SWEEP_INTERVAL_SECS`, `STALE_AFTER_SECS`
    /// - `EVENT_BUFFER_CAPACITY`
    pub fn from_env_or_default() -> Self {
        let mut config = Self {
            api: ApiServerConfig::from_env_or_default(),
            ..Self::default()
        };

        if let Ok(endpoint) = std::env::var("BRIDGE_ENDPOINT")
            && !endpoint.trim().is_empty()
        {
            config.bridge.endpoint = endpoint;
        }

        if let Some(timeout) = env_secs("PROFILE_FETCH_TIMEOUT_SECS") {
            config.profile_fetch_timeout = timeout;
        }
        if let Some(interval) = env_secs("SWEEP_INTERVAL_SECS") {
            config.ingest.sweep_interval = interval;
        }
        if let Some(threshold) = env_secs("STALE_AFTER_SECS") {
            config.ingest.stale_after = threshold;
        }

        if let Ok(capacity) = std::env::var("EVENT_BUFFER_CAPACITY")
            && let Ok(parsed) = capacity.parse::<usize>()
            && parsed > 0
        {
            config.buffer_capacity = parsed;
        }

        config
    }
}

/// Read a duration in whole seconds from an env var.
fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}
