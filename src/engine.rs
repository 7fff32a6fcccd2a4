//! The synchronization engine for one simulation session.
//!
//! [`SyncEngine`] owns the snapshot, the event router and the pacing queue.
//! It is driven from a single task (see [`crate::supervisor`]) through three
//! entry points: [`SyncEngine::handle_transport`] for wire events,
//! [`SyncEngine::release_tick`] when the release deadline passes, and
//! [`SyncEngine::teardown`]. Every entry point is a no-op once torn down.
//!
//! Consumers never touch the engine directly; they hold a
//! `watch::Receiver<SimulationSnapshot>` from [`SyncEngine::subscribe`].

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::model::SimulationSnapshot;
use crate::pacing::{DrainState, Gate, PacingQueue};
use crate::protocol::{TokenChunk, TurnEnd};
use crate::reducer::{admits_turn, reduce, Action, Outcome, Reduction};
use crate::router::{EventRouter, Route};
use crate::transport::TransportEvent;

pub struct SyncEngine {
    session_id: Uuid,
    state: SimulationSnapshot,
    router: EventRouter,
    queue: PacingQueue,
    pacing: Duration,
    release_at: Option<Instant>,
    alive: bool,
    violations: u64,
    publisher: watch::Sender<SimulationSnapshot>,
}

impl SyncEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_pacing(config.pacing_interval)
    }

    pub fn with_pacing(pacing: Duration) -> Self {
        let state = SimulationSnapshot::new();
        let (publisher, _) = watch::channel(state.clone());
        Self {
            session_id: Uuid::new_v4(),
            state,
            router: EventRouter::new(),
            queue: PacingQueue::new(),
            pacing,
            release_at: None,
            alive: true,
            violations: 0,
            publisher,
        }
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn subscribe(&self) -> watch::Receiver<SimulationSnapshot> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> &SimulationSnapshot {
        &self.state
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn drain_state(&self) -> DrainState {
        self.queue.state()
    }

    pub fn queued_tokens(&self) -> usize {
        self.queue.len()
    }

    /// When the next token is due, if the release timer is armed.
    pub fn release_deadline(&self) -> Option<Instant> {
        self.release_at
    }

    pub fn frames_discarded(&self) -> u64 {
        self.router.discarded()
    }

    pub fn violations(&self) -> u64 {
        self.violations
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    pub fn handle_transport(&mut self, event: TransportEvent) {
        if !self.alive {
            return;
        }
        match event {
            TransportEvent::Opened => {
                info!("transport open");
                self.apply(Action::ConnectionOpened);
            }
            TransportEvent::Message(raw) => self.ingest(&raw),
            TransportEvent::Failed(reason) => {
                error!(%reason, "transport failed");
                self.apply(Action::ConnectionFailed { reason });
            }
            TransportEvent::Closed => {
                info!("transport closed");
                self.apply(Action::ConnectionClosed);
            }
        }
    }

    /// Route one inbound text frame.
    pub fn ingest(&mut self, raw: &str) {
        if !self.alive {
            return;
        }
        let Some(route) = self.router.route(raw) else {
            return;
        };
        match route {
            Route::Direct(Action::TurnStarted(start)) => {
                // Checked up front: the boundary reset below is not undoable.
                if let Err(violation) = admits_turn(&self.state, &start) {
                    self.violations += 1;
                    warn!(action = "turn_started", %violation, "protocol violation, action discarded");
                    return;
                }
                self.reset_for_new_turn();
                self.apply(Action::TurnStarted(start));
            }
            Route::Direct(action) => self.apply(action),
            Route::Paced(chunk) => self.enqueue_token(chunk),
            Route::Gated(end) => self.gate_finalization(end),
        }
    }

    /// Release timer fired: apply the next queued token (and the held
    /// finalization if that emptied the queue), then re-arm or go idle.
    pub fn release_tick(&mut self) {
        if !self.alive {
            return;
        }
        for action in self.queue.release() {
            self.apply(action);
        }
        self.release_at = match self.queue.state() {
            DrainState::Draining => Some(Instant::now() + self.pacing),
            DrainState::Idle => None,
        };
    }

    /// Release everything queued right now, in order.
    pub fn drain_now(&mut self) {
        if !self.alive {
            return;
        }
        while self.queue.state() == DrainState::Draining {
            for action in self.queue.release() {
                self.apply(action);
            }
        }
        self.release_at = None;
    }

    /// Stop the engine. Unapplied queue entries are dropped. Returns `false`
    /// if the engine was already torn down.
    pub fn teardown(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.alive = false;
        let dropped = self.queue.len();
        self.queue.clear();
        self.release_at = None;
        info!(
            dropped_tokens = dropped,
            discarded_frames = self.router.discarded(),
            violations = self.violations,
            "session torn down"
        );
        true
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn enqueue_token(&mut self, chunk: TokenChunk) {
        if self.pacing.is_zero() {
            self.apply(Action::TokenAppended(chunk));
            return;
        }
        if self.queue.push_token(chunk) {
            self.release_at = Some(Instant::now() + self.pacing);
        }
    }

    fn gate_finalization(&mut self, end: TurnEnd) {
        if self.pacing.is_zero() {
            self.apply(Action::TurnFinalized(end));
            return;
        }
        match self.queue.offer_finalization(end) {
            Gate::Immediate(end) => self.apply(Action::TurnFinalized(end)),
            Gate::Held => debug!(queued = self.queue.len(), "finalization held until queue drains"),
            Gate::Replaced(previous) => warn!(
                displaced_turn = %previous.turn_id,
                "second finalization arrived while one was held; keeping the newer one"
            ),
        }
    }

    /// A new turn supersedes everything still queued for the previous one.
    /// The held finalization carries the authoritative text, so it is
    /// applied rather than dropped.
    fn reset_for_new_turn(&mut self) {
        let flushed = self.queue.flush();
        self.release_at = None;
        if flushed.discarded_tokens > 0 {
            debug!(discarded = flushed.discarded_tokens, "turn boundary flushed queued tokens");
        }
        if let Some(end) = flushed.finalization {
            self.apply(Action::TurnFinalized(end));
        }
    }

    fn apply(&mut self, action: Action) {
        let name = action.name();
        let current = std::mem::take(&mut self.state);
        let Reduction { state, outcome } = reduce(current, action);
        self.state = state;
        match outcome {
            Outcome::Applied => {
                trace!(action = name, revision = self.state.revision, "applied");
                self.publish();
            }
            Outcome::Recovered(violation) => {
                self.violations += 1;
                warn!(action = name, %violation, "protocol violation recovered");
                self.publish();
            }
            Outcome::Rejected(violation) => {
                self.violations += 1;
                warn!(action = name, %violation, "protocol violation, action discarded");
            }
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
