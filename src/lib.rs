//! # council-sync
//!
//! Client-side synchronization engine for streamed city-council debate
//! simulations. A simulation server pushes phase changes, persona
//! introductions, token-by-token speech and a final analysis over a
//! WebSocket; this crate turns that stream into an ordered, human-paced
//! transcript snapshot that a renderer or narrator can observe.
//!
//! ## Pipeline
//! ```text
//! transport ─▶ supervisor ─▶ router ─┬─────────────────────▶ reducer ─▶ watch<SimulationSnapshot>
//!                                    └─▶ pacing queue ─tick─┘
//! ```
//!
//! - [`model`]: personas, turns, analysis, the snapshot
//! - [`protocol`]: `{type, payload}` wire messages
//! - [`reducer`]: pure `(snapshot, action) -> snapshot`
//! - [`pacing`]: token release queue with finalization gating
//! - [`router`]: decode + direct/paced/gated classification
//! - [`engine`]: one session's state machine
//! - [`transport`] / [`supervisor`]: the socket and the task that drives it
//! - [`narration`], [`transcript`]: consumer helpers

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod narration;
pub mod pacing;
pub mod protocol;
pub mod reducer;
pub mod router;
pub mod supervisor;
pub mod transcript;
pub mod transport;

pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use error::{ConfigError, SyncError};
pub use model::{
    AnalysisResult, ConnectionStatus, DebatePhase, Persona, PersonaRole, SimulationSnapshot, SimulationStatus,
    TranscriptTurn,
};
pub use narration::NarrationTracker;
pub use supervisor::Session;
pub use transport::{ChannelTransport, Transport, TransportEvent, WsTransport};
