//! Exactly-once "turn finalized" notifications for narration consumers.
//!
//! A speech narrator only wants sealed turns, and it wants each one once even
//! though it sees many snapshots per turn. [`NarrationTracker`] remembers
//! which turn ids it already handed out.

use std::collections::HashSet;

use crate::model::{SimulationSnapshot, TranscriptTurn};

#[derive(Debug, Default)]
pub struct NarrationTracker {
    announced: HashSet<String>,
}

impl NarrationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns that became complete since the last call, in transcript order.
    pub fn observe(&mut self, snapshot: &SimulationSnapshot) -> Vec<TranscriptTurn> {
        snapshot
            .completed_turns()
            .filter(|turn| self.announced.insert(turn.turn_id.clone()))
            .cloned()
            .collect()
    }

    pub fn announced(&self) -> usize {
        self.announced.len()
    }
}
