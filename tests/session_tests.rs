//! Tests for the session supervisor: paced draining in real (paused) time,
//! shutdown and teardown, and transport lifecycle handling.

use std::time::Duration;

use council_sync::model::{ConnectionStatus, Persona, PersonaRole};
use council_sync::protocol::{InboundMessage, TokenChunk, TurnEnd, TurnStart};
use council_sync::supervisor::supervise;
use council_sync::{ChannelTransport, DebatePhase, EngineConfig, Session, SyncEngine};
use tokio::sync::oneshot;
use tokio::time::Instant;

const PACE: Duration = Duration::from_millis(30);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn persona(id: &str) -> InboundMessage {
    InboundMessage::PersonaIntro(Persona {
        id: id.to_string(),
        name: "Councilmember Ortiz".to_string(),
        role: PersonaRole::CouncilMember,
        archetype: None,
        age: Some(58),
        occupation: "Retired engineer".to_string(),
        background: String::new(),
        speaking_style: String::new(),
        primary_concern: "traffic".to_string(),
        secondary_concerns: Vec::new(),
        intensity: 7,
        color: "#ef4444".to_string(),
    })
}

fn start(turn: &str) -> InboundMessage {
    InboundMessage::SpeakingStart(TurnStart {
        turn_id: turn.to_string(),
        persona_id: "c1".to_string(),
        persona_name: "Councilmember Ortiz".to_string(),
        phase: DebatePhase::CouncilQa,
    })
}

fn token(turn: &str, text: &str) -> InboundMessage {
    InboundMessage::Token(TokenChunk { turn_id: turn.to_string(), token: text.to_string(), persona_id: "c1".to_string() })
}

fn end(turn: &str, text: &str) -> InboundMessage {
    InboundMessage::SpeakingEnd(TurnEnd {
        turn_id: turn.to_string(),
        persona_id: "c1".to_string(),
        full_text: text.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Draining
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_queue_drains_after_transport_closes() {
    let (feed, transport) = ChannelTransport::new();
    let mut session = Session::spawn(SyncEngine::with_pacing(PACE), transport);
    let began = Instant::now();

    feed.open();
    for msg in [persona("c1"), start("t1"), token("t1", "What"), token("t1", " about"), token("t1", " parking?")] {
        feed.message(&msg);
    }
    feed.message(&end("t1", "What about parking?"));
    feed.close();

    let last = session.finished().await.expect("final snapshot");
    assert!(began.elapsed() >= PACE * 3);
    assert_eq!(last.connection, ConnectionStatus::Disconnected);
    assert_eq!(last.turns.len(), 1);
    assert_eq!(last.turns[0].content, "What about parking?");
    assert!(last.turns[0].is_complete);
    assert!(last.current_speaker.is_none());
    assert!(session.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_sees_content_grow() {
    let (feed, transport) = ChannelTransport::new();
    let session = Session::spawn(SyncEngine::with_pacing(PACE), transport);
    let mut rx = session.subscribe();

    feed.open();
    for msg in [persona("c1"), start("t1"), token("t1", "a"), token("t1", "b"), token("t1", "c")] {
        feed.message(&msg);
    }
    feed.message(&end("t1", "abc."));
    feed.close();

    let mut seen = Vec::new();
    while rx.changed().await.is_ok() {
        if let Some(turn) = rx.borrow_and_update().turns.first() {
            seen.push((turn.content.clone(), turn.is_complete));
        }
    }
    assert_eq!(seen.last(), Some(&("abc.".to_string(), true)));
    for (content, complete) in &seen {
        if !complete {
            assert!("abc".starts_with(content.as_str()), "unexpected partial {content:?}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_revision_only_moves_forward() {
    let (feed, transport) = ChannelTransport::new();
    let session = Session::spawn(SyncEngine::with_pacing(PACE), transport);
    let mut rx = session.subscribe();

    feed.open();
    feed.message(&persona("c1"));
    feed.text("{garbage");
    feed.message(&start("t1"));
    feed.close();

    let mut last = 0;
    while rx.changed().await.is_ok() {
        let revision = rx.borrow_and_update().revision;
        assert!(revision > last);
        last = revision;
    }
    // opened, persona, start, closed
    assert_eq!(last, 4);
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_teardown_drops_queued_tokens_and_is_idempotent() {
    let (feed, transport) = ChannelTransport::new();
    let mut session = Session::spawn(SyncEngine::with_pacing(Duration::from_secs(5)), transport);
    let mut rx = session.subscribe();

    feed.open();
    feed.message(&persona("c1"));
    feed.message(&start("t1"));
    feed.message(&token("t1", "never shown"));
    rx.wait_for(|snap| !snap.turns.is_empty()).await.expect("turn started");
    tokio::task::yield_now().await;

    let last = session.teardown().await.expect("first teardown");
    assert_eq!(last.turns[0].content, "");
    assert!(!last.turns[0].is_complete);
    assert!(session.teardown().await.is_none());
    assert!(session.finished().await.is_none());
    assert!(session.is_finished());
    assert!(!feed.close(), "transport should be closed after teardown");
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_stops_the_task() {
    let (feed, transport) = ChannelTransport::new();
    let session = Session::spawn(SyncEngine::with_pacing(PACE), transport);
    feed.open();
    drop(session);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!feed.open());
}

#[tokio::test(start_paused = true)]
async fn test_supervise_returns_on_shutdown() {
    let (feed, transport) = ChannelTransport::new();
    let (tx, rx) = oneshot::channel();
    let task = tokio::spawn(supervise(SyncEngine::with_pacing(PACE), transport, rx));
    feed.open();
    tokio::time::sleep(Duration::from_millis(5)).await;
    tx.send(()).expect("supervisor alive");
    let last = task.await.expect("join");
    assert_eq!(last.connection, ConnectionStatus::Connected);
}

// ---------------------------------------------------------------------------
// Transport lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_transport_failure_ends_session_with_error() {
    let (feed, transport) = ChannelTransport::new();
    let mut session = Session::spawn(SyncEngine::with_pacing(PACE), transport);
    feed.open();
    feed.message(&persona("c1"));
    feed.fail("connection reset by peer");

    let last = session.finished().await.expect("final snapshot");
    assert_eq!(last.connection, ConnectionStatus::Error);
    assert_eq!(last.error.as_deref(), Some("connection reset by peer"));
    assert_eq!(last.personas.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_feed_counts_as_close() {
    let (feed, transport) = ChannelTransport::new();
    let mut session = Session::spawn(SyncEngine::with_pacing(PACE), transport);
    feed.open();
    drop(feed);
    let last = session.finished().await.expect("final snapshot");
    assert_eq!(last.connection, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_unreachable_endpoint_reports_error() {
    let config = EngineConfig::new("ws://127.0.0.1:9/ws/simulation").with_pacing(Duration::ZERO);
    let mut session = Session::connect(&config, "sim-1");
    let last = tokio::time::timeout(Duration::from_secs(10), session.finished())
        .await
        .expect("session ended")
        .expect("final snapshot");
    assert_eq!(last.connection, ConnectionStatus::Error);
    assert!(last.error.is_some());
    assert!(last.turns.is_empty());
}
