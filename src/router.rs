//! Event router: decodes inbound frames and decides which path each action
//! takes to the reducer.
//!
//! Control-plane messages go straight to the reducer. Tokens go through the
//! pacing queue, and `speaking_end` goes through its finalization gate. A
//! frame that fails to decode is logged and dropped here; nothing downstream
//! ever sees it.

use tracing::{trace, warn};

use crate::error::SyncError;
use crate::protocol::{InboundMessage, TokenChunk, TurnEnd};
use crate::reducer::Action;

/// Where a decoded message must go.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Direct(Action),
    Paced(TokenChunk),
    Gated(TurnEnd),
}

impl From<InboundMessage> for Route {
    fn from(msg: InboundMessage) -> Self {
        match msg {
            InboundMessage::Token(chunk) => Route::Paced(chunk),
            InboundMessage::SpeakingEnd(end) => Route::Gated(end),
            other => Route::Direct(other.into()),
        }
    }
}

/// Decode and classify one frame without logging.
pub fn classify(raw: &str) -> Result<Route, SyncError> {
    InboundMessage::decode(raw).map(Route::from)
}

/// Stateful front of the engine: counts what it routed and what it dropped.
#[derive(Debug, Default)]
pub struct EventRouter {
    routed: u64,
    discarded: u64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one frame. `None` means the frame was malformed and has been
    /// logged and discarded.
    pub fn route(&mut self, raw: &str) -> Option<Route> {
        match classify(raw) {
            Ok(route) => {
                self.routed += 1;
                trace!(route = route_kind(&route), "frame routed");
                Some(route)
            }
            Err(e) => {
                self.discarded += 1;
                warn!(error = %e, frame_len = raw.len(), "discarding undecodable frame");
                None
            }
        }
    }

    pub fn routed(&self) -> u64 {
        self.routed
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

fn route_kind(route: &Route) -> &'static str {
    match route {
        Route::Direct(action) => action.name(),
        Route::Paced(_) => "token",
        Route::Gated(_) => "speaking_end",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
