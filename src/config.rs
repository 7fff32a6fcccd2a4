//! Engine configuration: the transport endpoint and the token pacing
//! interval, both fixed for the lifetime of a session.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `COUNCIL_SYNC_*` environment variables.
//!
//! ```toml
//! endpoint = "ws://127.0.0.1:8000/ws/simulation"
//! pacing_interval_ms = 30
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8000/ws/simulation";
pub const DEFAULT_PACING_MS: u64 = 30;

pub const ENV_ENDPOINT: &str = "COUNCIL_SYNC_ENDPOINT";
pub const ENV_PACING_MS: &str = "COUNCIL_SYNC_PACING_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base WebSocket URL; the simulation id is appended as a path segment.
    pub endpoint: String,
    /// Delay between two token releases. Zero disables pacing.
    pub pacing_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    endpoint: String,
    pacing_interval_ms: u64,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self { endpoint: DEFAULT_ENDPOINT.to_string(), pacing_interval_ms: DEFAULT_PACING_MS }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            pacing_interval: Duration::from_millis(DEFAULT_PACING_MS),
        }
    }
}

impl EngineConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Self::default() }
    }

    pub fn with_pacing(mut self, interval: Duration) -> Self {
        self.pacing_interval = interval;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        let config = Self {
            endpoint: file.endpoint,
            pacing_interval: Duration::from_millis(file.pacing_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Apply `COUNCIL_SYNC_ENDPOINT` / `COUNCIL_SYNC_PACING_MS`.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(raw) = lookup(ENV_PACING_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                field: ENV_PACING_MS,
                detail: format!("'{raw}' is not a whole number of milliseconds"),
            })?;
            self.pacing_interval = Duration::from_millis(ms);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                field: "endpoint",
                detail: format!("'{}' is not a ws:// or wss:// URL", self.endpoint),
            });
        }
        Ok(())
    }

    /// URL of the stream for one simulation.
    pub fn simulation_endpoint(&self, simulation_id: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), simulation_id)
    }

    pub fn pacing_enabled(&self) -> bool {
        !self.pacing_interval.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
