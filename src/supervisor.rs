//! Connection supervisor: the single task that owns a session.
//!
//! ## Lifecycle
//! 1. [`Session::connect`] (or [`Session::spawn`] with any [`Transport`])
//!    starts the loop; the snapshot reads `connecting`.
//! 2. The loop multiplexes three sources with `tokio::select!`: the
//!    shutdown signal, the pacing release deadline, and the transport.
//! 3. Once the transport reports `Closed`/`Failed` (or simply ends) it is no
//!    longer polled. Tokens already queued keep draining at the configured
//!    pace, then the loop ends on its own.
//! 4. [`Session::teardown`] stops the loop early: the transport is closed,
//!    the timer cancelled and unapplied entries dropped.
//!
//! There is no reconnection. A new session needs a new [`Session`].

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_stream::StreamExt;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::SyncEngine;
use crate::model::SimulationSnapshot;
use crate::pacing::DrainState;
use crate::transport::{Transport, TransportEvent, WsTransport};

/// Drive `engine` from `transport` until the session ends or `shutdown`
/// fires (or its sender is dropped). Returns the final snapshot.
pub async fn supervise<T: Transport>(
    mut engine: SyncEngine,
    mut transport: T,
    mut shutdown: oneshot::Receiver<()>,
) -> SimulationSnapshot {
    let mut transport_open = true;

    loop {
        if !transport_open && engine.drain_state() == DrainState::Idle {
            break;
        }
        let deadline = engine.release_deadline();
        let armed = deadline.is_some();

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if armed => {
                engine.release_tick();
            }
            event = transport.next(), if transport_open => match event {
                Some(event) => {
                    if event.is_terminal() {
                        transport_open = false;
                    }
                    engine.handle_transport(event);
                }
                None => {
                    transport_open = false;
                    engine.handle_transport(TransportEvent::Closed);
                }
            },
        }
    }

    transport.close();
    engine.teardown();
    engine.snapshot().clone()
}

/// Handle to a running session.
pub struct Session {
    session_id: Uuid,
    snapshots: watch::Receiver<SimulationSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<SimulationSnapshot>>,
}

impl Session {
    /// Open a WebSocket session for `simulation_id`.
    pub fn connect(config: &EngineConfig, simulation_id: &str) -> Self {
        let transport = WsTransport::connect(config.simulation_endpoint(simulation_id));
        Self::spawn(SyncEngine::new(config), transport)
    }

    /// Run `engine` over an arbitrary transport on the current runtime.
    pub fn spawn<T: Transport + 'static>(engine: SyncEngine, transport: T) -> Self {
        let session_id = engine.session_id();
        let snapshots = engine.subscribe();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let span = info_span!("session", id = %session_id);
        let task = tokio::spawn(supervise(engine, transport, shutdown_rx).instrument(span));
        Self { session_id, snapshots, shutdown: Some(shutdown_tx), task: Some(task) }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SimulationSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SimulationSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the session to end by itself. Returns the final snapshot, or
    /// `None` if it was already collected.
    pub async fn finished(&mut self) -> Option<SimulationSnapshot> {
        let task = self.task.take()?;
        let snapshot = task.await.ok();
        self.shutdown = None;
        snapshot
    }

    /// Stop the session now. Safe to call any number of times; only the
    /// first call returns the final snapshot.
    pub async fn teardown(&mut self) -> Option<SimulationSnapshot> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
