//! # Stage: Pacing Queue
//!
//! ## Responsibility
//! Decouples the rate at which streamed tokens reach the reducer from the
//! rate at which they arrive, so the transcript reveals at a readable pace.
//!
//! ## Guarantees
//! - FIFO: tokens are released in arrival order, one per tick.
//! - Gating: a held finalization is released only together with the last
//!   queued token, never ahead of it.
//! - Bounded bookkeeping: at most one finalization is held at a time.
//!
//! ## NOT Responsible For
//! - Timing: the queue only reports whether it is [`DrainState::Draining`];
//!   the session loop owns the release deadline.
//! - Validation: stale tokens are passed through and rejected by the reducer.

use std::collections::VecDeque;

use crate::protocol::{TokenChunk, TurnEnd};
use crate::reducer::Action;

/// Whether the release timer should be armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    Draining,
}

/// What a finalization offer resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// Nothing is queued; apply now.
    Immediate(TurnEnd),
    /// Held until the queue drains.
    Held,
    /// Held, and displaced an earlier held finalization for another turn.
    Replaced(TurnEnd),
}

/// Entries taken out of the queue when a new turn begins.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Flushed {
    pub discarded_tokens: usize,
    pub finalization: Option<TurnEnd>,
}

#[derive(Debug, Default)]
pub struct PacingQueue {
    tokens: VecDeque<TokenChunk>,
    finalization: Option<TurnEnd>,
}

impl PacingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DrainState {
        if self.tokens.is_empty() {
            DrainState::Idle
        } else {
            DrainState::Draining
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn pending_finalization(&self) -> Option<&TurnEnd> {
        self.finalization.as_ref()
    }

    /// Enqueue a token. Returns `true` when this moved the queue from
    /// `Idle` to `Draining`, i.e. the caller must arm the release timer.
    pub fn push_token(&mut self, chunk: TokenChunk) -> bool {
        let was_idle = self.tokens.is_empty();
        self.tokens.push_back(chunk);
        was_idle
    }

    /// Offer a finalization for gating.
    pub fn offer_finalization(&mut self, end: TurnEnd) -> Gate {
        if self.tokens.is_empty() {
            return Gate::Immediate(end);
        }
        match self.finalization.replace(end) {
            Some(previous) => Gate::Replaced(previous),
            None => Gate::Held,
        }
    }

    /// One release tick: the oldest token, followed by the held
    /// finalization if that token emptied the queue.
    pub fn release(&mut self) -> Vec<Action> {
        let mut out = Vec::with_capacity(2);
        if let Some(chunk) = self.tokens.pop_front() {
            out.push(Action::TokenAppended(chunk));
        }
        if self.tokens.is_empty() {
            if let Some(end) = self.finalization.take() {
                out.push(Action::TurnFinalized(end));
            }
        }
        out
    }

    /// Turn-boundary reset: drop every queued token and hand back the held
    /// finalization so the caller can settle it.
    pub fn flush(&mut self) -> Flushed {
        let discarded_tokens = self.tokens.len();
        self.tokens.clear();
        Flushed { discarded_tokens, finalization: self.finalization.take() }
    }

    /// Teardown: forget everything.
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.finalization = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
