//! Crate-level error types.
//!
//! None of these ever reach a snapshot consumer during a session: decode
//! failures are logged and dropped by the engine, configuration failures are
//! reported by the binary before a session starts.

use std::path::PathBuf;

/// Failure to turn one inbound wire message into a typed action.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The frame is not a `{type, payload}` JSON object.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// The `type` discriminator names no known message.
    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    /// The payload does not match the shape required by its `type`.
    #[error("malformed '{kind}' payload: {source}")]
    MalformedPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to load or validate an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}
