//! Pure state transitions: `(SimulationSnapshot, Action) -> SimulationSnapshot`.
//!
//! The reducer never logs and never fails. Anything inconsistent with the
//! current state comes back as a [`ProtocolViolation`] inside the
//! [`Outcome`], and the caller decides how loudly to report it. A rejected
//! action leaves the snapshot untouched, revision included.

use crate::model::{
    AgentProgress, AnalysisResult, ConnectionStatus, Persona, SimulationSnapshot, SimulationStatus, Speaker,
    TranscriptTurn,
};
use crate::protocol::{ErrorReport, InboundMessage, PhaseChange, StatusReport, TokenChunk, TurnEnd, TurnStart};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// One typed state transition request.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ConnectionOpened,
    ConnectionClosed,
    ConnectionFailed { reason: String },
    PhaseChanged(PhaseChange),
    PersonaIntroduced(Persona),
    TurnStarted(TurnStart),
    TokenAppended(TokenChunk),
    TurnFinalized(TurnEnd),
    AnalysisReceived(AnalysisResult),
    SimulationCompleted,
    StatusUpdated(StatusReport),
    SimulationErrored(ErrorReport),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::ConnectionOpened => "connection_opened",
            Action::ConnectionClosed => "connection_closed",
            Action::ConnectionFailed { .. } => "connection_failed",
            Action::PhaseChanged(_) => "phase_changed",
            Action::PersonaIntroduced(_) => "persona_introduced",
            Action::TurnStarted(_) => "turn_started",
            Action::TokenAppended(_) => "token_appended",
            Action::TurnFinalized(_) => "turn_finalized",
            Action::AnalysisReceived(_) => "analysis_received",
            Action::SimulationCompleted => "simulation_completed",
            Action::StatusUpdated(_) => "status_updated",
            Action::SimulationErrored(_) => "simulation_errored",
        }
    }
}

impl From<InboundMessage> for Action {
    fn from(msg: InboundMessage) -> Self {
        match msg {
            InboundMessage::PhaseChange(p) => Action::PhaseChanged(p),
            InboundMessage::PersonaIntro(p) => Action::PersonaIntroduced(p),
            InboundMessage::SpeakingStart(s) => Action::TurnStarted(s),
            InboundMessage::Token(t) => Action::TokenAppended(t),
            InboundMessage::SpeakingEnd(e) => Action::TurnFinalized(e),
            InboundMessage::Analysis(a) => Action::AnalysisReceived(a),
            InboundMessage::Complete(_) => Action::SimulationCompleted,
            InboundMessage::Status(s) => Action::StatusUpdated(s),
            InboundMessage::Error(e) => Action::SimulationErrored(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A structurally valid event that contradicts the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("persona {0} was already introduced")]
    DuplicatePersona(String),
    #[error("turn {turn_id} names unknown persona {persona_id}")]
    UnknownPersona { turn_id: String, persona_id: String },
    #[error("turn id {0} was already used")]
    DuplicateTurn(String),
    #[error("turn {incoming} started while {open} was still open; {open} force-closed")]
    TurnStillOpen { open: String, incoming: String },
    #[error("token for {0} which is not the open turn")]
    StaleToken(String),
    #[error("finalization for unknown turn {0}")]
    UnknownTurn(String),
    #[error("turn {0} is already complete")]
    TurnAlreadyComplete(String),
    #[error("analysis was already received")]
    AnalysisAlreadySet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    /// Applied after a defensive correction of the snapshot.
    Recovered(ProtocolViolation),
    /// Discarded; the snapshot is unchanged.
    Rejected(ProtocolViolation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub state: SimulationSnapshot,
    pub outcome: Outcome,
}

impl Reduction {
    fn applied(mut state: SimulationSnapshot) -> Self {
        state.revision += 1;
        Self { state, outcome: Outcome::Applied }
    }

    fn recovered(mut state: SimulationSnapshot, violation: ProtocolViolation) -> Self {
        state.revision += 1;
        Self { state, outcome: Outcome::Recovered(violation) }
    }

    fn rejected(state: SimulationSnapshot, violation: ProtocolViolation) -> Self {
        Self { state, outcome: Outcome::Rejected(violation) }
    }

    pub fn changed(&self) -> bool {
        !matches!(self.outcome, Outcome::Rejected(_))
    }
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Apply one action to a snapshot.
pub fn reduce(mut state: SimulationSnapshot, action: Action) -> Reduction {
    match action {
        Action::ConnectionOpened => {
            state.connection = ConnectionStatus::Connected;
            Reduction::applied(state)
        }
        Action::ConnectionClosed => {
            // A failure already recorded stays visible after the socket closes.
            if state.connection != ConnectionStatus::Error {
                state.connection = ConnectionStatus::Disconnected;
            }
            Reduction::applied(state)
        }
        Action::ConnectionFailed { reason } => {
            state.connection = ConnectionStatus::Error;
            state.error = Some(reason);
            Reduction::applied(state)
        }
        Action::PhaseChanged(change) => {
            state.phase = Some(change.phase);
            state.phase_description = Some(change.description);
            if !state.status.is_terminal() {
                state.status = change.phase.into();
            }
            Reduction::applied(state)
        }
        Action::PersonaIntroduced(persona) => {
            if state.persona(&persona.id).is_some() {
                return Reduction::rejected(state, ProtocolViolation::DuplicatePersona(persona.id));
            }
            state.personas.push(persona);
            Reduction::applied(state)
        }
        Action::TurnStarted(start) => start_turn(state, start),
        Action::TokenAppended(chunk) => {
            let open = state
                .turns
                .iter_mut()
                .rev()
                .find(|t| !t.is_complete && t.turn_id == chunk.turn_id);
            match open {
                Some(turn) => {
                    turn.content.push_str(&chunk.token);
                    Reduction::applied(state)
                }
                None => Reduction::rejected(state, ProtocolViolation::StaleToken(chunk.turn_id)),
            }
        }
        Action::TurnFinalized(end) => {
            let Some(turn) = state.turns.iter_mut().find(|t| t.turn_id == end.turn_id) else {
                return Reduction::rejected(state, ProtocolViolation::UnknownTurn(end.turn_id));
            };
            if turn.is_complete {
                return Reduction::rejected(state, ProtocolViolation::TurnAlreadyComplete(end.turn_id));
            }
            turn.content = end.full_text;
            turn.is_complete = true;
            if state.current_speaker.as_ref().is_some_and(|s| s.turn_id == end.turn_id) {
                state.current_speaker = None;
            }
            Reduction::applied(state)
        }
        Action::AnalysisReceived(result) => {
            if state.analysis.is_some() {
                return Reduction::rejected(state, ProtocolViolation::AnalysisAlreadySet);
            }
            state.analysis = Some(result);
            if !state.status.is_terminal() {
                state.status = SimulationStatus::Analysis;
            }
            Reduction::applied(state)
        }
        Action::SimulationCompleted => {
            state.status = SimulationStatus::Complete;
            // A turn still draining keeps its speaker until its finalization lands.
            if state.open_turn().is_none() {
                state.current_speaker = None;
            }
            Reduction::applied(state)
        }
        Action::StatusUpdated(report) => {
            if let Some(agent_id) = report.agent_id {
                match state.agents.iter_mut().find(|a| a.agent_id == agent_id) {
                    Some(agent) => {
                        agent.message = report.message.clone();
                        if report.agent_status.is_some() {
                            agent.state = report.agent_status;
                        }
                    }
                    None => state.agents.push(AgentProgress {
                        agent_id,
                        state: report.agent_status,
                        message: report.message.clone(),
                    }),
                }
            }
            if report.progress.is_some() {
                state.progress = report.progress;
            }
            state.status_message = report.message;
            Reduction::applied(state)
        }
        Action::SimulationErrored(report) => {
            state.status = SimulationStatus::Error;
            state.error = Some(report.message);
            Reduction::applied(state)
        }
    }
}

/// Whether `start` may open a turn in `state`: its persona must be known and
/// its id unused. A refused start must not disturb the turn that is open.
pub fn admits_turn(state: &SimulationSnapshot, start: &TurnStart) -> Result<(), ProtocolViolation> {
    if state.persona(&start.persona_id).is_none() {
        return Err(ProtocolViolation::UnknownPersona {
            turn_id: start.turn_id.clone(),
            persona_id: start.persona_id.clone(),
        });
    }
    if state.turn(&start.turn_id).is_some() {
        return Err(ProtocolViolation::DuplicateTurn(start.turn_id.clone()));
    }
    Ok(())
}

fn start_turn(mut state: SimulationSnapshot, start: TurnStart) -> Reduction {
    if let Err(violation) = admits_turn(&state, &start) {
        return Reduction::rejected(state, violation);
    }

    // Force-close whatever is still open: it keeps the text it accumulated.
    let mut violation = None;
    if let Some(open) = state.turns.iter_mut().find(|t| !t.is_complete) {
        open.is_complete = true;
        violation = Some(ProtocolViolation::TurnStillOpen {
            open: open.turn_id.clone(),
            incoming: start.turn_id.clone(),
        });
    }

    let persona_name = if start.persona_name.is_empty() {
        state.persona(&start.persona_id).map(|p| p.name.clone()).unwrap_or_default()
    } else {
        start.persona_name
    };

    state.current_speaker = Some(Speaker {
        turn_id: start.turn_id.clone(),
        persona_id: start.persona_id.clone(),
        persona_name: persona_name.clone(),
    });
    state.turns.push(TranscriptTurn {
        turn_id: start.turn_id,
        persona_id: start.persona_id,
        persona_name,
        phase: start.phase,
        content: String::new(),
        is_complete: false,
    });

    match violation {
        Some(v) => Reduction::recovered(state, v),
        None => Reduction::applied(state),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DebatePhase, PersonaRole};

    fn persona(id: &str) -> Persona {
        Persona {
            id: id.to_string(),
            name: format!("Persona {id}"),
            role: PersonaRole::Resident,
            archetype: None,
            age: None,
            occupation: String::new(),
            background: String::new(),
            speaking_style: String::new(),
            primary_concern: String::new(),
            secondary_concerns: Vec::new(),
            intensity: 5,
            color: "#6366f1".to_string(),
        }
    }

    fn start(turn: &str, persona: &str) -> Action {
        Action::TurnStarted(TurnStart {
            turn_id: turn.to_string(),
            persona_id: persona.to_string(),
            persona_name: String::new(),
            phase: DebatePhase::Opening,
        })
    }

    fn token(turn: &str, text: &str) -> Action {
        Action::TokenAppended(TokenChunk {
            turn_id: turn.to_string(),
            token: text.to_string(),
            persona_id: String::new(),
        })
    }

    fn end(turn: &str, text: &str) -> Action {
        Action::TurnFinalized(TurnEnd {
            turn_id: turn.to_string(),
            persona_id: String::new(),
            full_text: text.to_string(),
        })
    }

    fn run(actions: Vec<Action>) -> (SimulationSnapshot, Vec<Outcome>) {
        let mut state = SimulationSnapshot::new();
        let mut outcomes = Vec::new();
        for action in actions {
            let r = reduce(state, action);
            r.state.check_invariants().expect("invariants hold after every reduction");
            state = r.state;
            outcomes.push(r.outcome);
        }
        (state, outcomes)
    }

    #[test]
    fn test_connection_transitions() {
        let (s, _) = run(vec![Action::ConnectionOpened]);
        assert_eq!(s.connection, ConnectionStatus::Connected);
        let (s, _) = run(vec![Action::ConnectionOpened, Action::ConnectionClosed]);
        assert_eq!(s.connection, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_connection_error_is_sticky_across_close() {
        let (s, _) = run(vec![
            Action::ConnectionOpened,
            Action::ConnectionFailed { reason: "reset by peer".to_string() },
            Action::ConnectionClosed,
        ]);
        assert_eq!(s.connection, ConnectionStatus::Error);
        assert_eq!(s.error.as_deref(), Some("reset by peer"));
    }

    #[test]
    fn test_phase_change_mirrors_status() {
        let (s, _) = run(vec![Action::PhaseChanged(PhaseChange {
            phase: DebatePhase::PublicComment,
            description: "The floor is open".to_string(),
        })]);
        assert_eq!(s.phase, Some(DebatePhase::PublicComment));
        assert_eq!(s.status, SimulationStatus::PublicComment);
        assert_eq!(s.phase_description.as_deref(), Some("The floor is open"));
    }

    #[test]
    fn test_duplicate_persona_rejected() {
        let (s, outcomes) = run(vec![
            Action::PersonaIntroduced(persona("p1")),
            Action::PersonaIntroduced(persona("p1")),
        ]);
        assert_eq!(s.personas.len(), 1);
        assert_eq!(outcomes[1], Outcome::Rejected(ProtocolViolation::DuplicatePersona("p1".into())));
        assert_eq!(s.revision, 1);
    }

    #[test]
    fn test_hello_world_turn() {
        let (s, outcomes) = run(vec![
            Action::PersonaIntroduced(persona("p1")),
            start("t1", "p1"),
            token("t1", "Hello"),
            token("t1", ", world"),
            end("t1", "Hello, world!"),
        ]);
        assert!(outcomes.iter().all(|o| *o == Outcome::Applied));
        assert_eq!(s.turns.len(), 1);
        assert_eq!(s.turns[0].content, "Hello, world!");
        assert!(s.turns[0].is_complete);
        assert!(s.current_speaker.is_none());
        assert_eq!(s.turns[0].persona_name, "Persona p1");
    }

    #[test]
    fn test_tokens_accumulate_before_finalization() {
        let (s, _) = run(vec![
            Action::PersonaIntroduced(persona("p1")),
            start("t1", "p1"),
            token("t1", "We "),
            token("t1", "object"),
        ]);
        assert_eq!(s.turns[0].content, "We object");
        assert!(!s.turns[0].is_complete);
        assert_eq!(s.current_speaker.as_ref().map(|sp| sp.turn_id.as_str()), Some("t1"));
    }

    #[test]
    fn test_finalization_text_is_authoritative() {
        let (s, _) = run(vec![
            Action::PersonaIntroduced(persona("p1")),
            start("t1", "p1"),
            token("t1", "garbled partial"),
            end("t1", "X"),
        ]);
        assert_eq!(s.turns[0].content, "X");
    }

    #[test]
    fn test_stale_token_is_discarded() {
        let (s, outcomes) = run(vec![
            Action::PersonaIntroduced(persona("p1")),
            start("t1", "p1"),
            end("t1", "done"),
            token("t1", " late"),
        ]);
        assert_eq!(s.turns[0].content, "done");
        assert_eq!(outcomes[3], Outcome::Rejected(ProtocolViolation::StaleToken("t1".into())));
    }

    #[test]
    fn test_finalization_for_unknown_turn_rejected() {
        let (s, outcomes) = run(vec![end("ghost", "boo")]);
        assert!(s.turns.is_empty());
        assert_eq!(outcomes[0], Outcome::Rejected(ProtocolViolation::UnknownTurn("ghost".into())));
    }

    #[test]
    fn test_second_finalization_rejected() {
        let (s, outcomes) = run(vec![
            Action::PersonaIntroduced(persona("p1")),
            start("t1", "p1"),
            end("t1", "first"),
            end("t1", "second"),
        ]);
        assert_eq!(s.turns[0].content, "first");
        assert!(matches!(outcomes[3], Outcome::Rejected(ProtocolViolation::TurnAlreadyComplete(_))));
    }

    #[test]
    fn test_turn_for_unknown_persona_rejected() {
        let (s, outcomes) = run(vec![start("t1", "nobody")]);
        assert!(s.turns.is_empty());
        assert!(s.current_speaker.is_none());
        assert!(matches!(outcomes[0], Outcome::Rejected(ProtocolViolation::UnknownPersona { .. })));
    }

    #[test]
    fn test_reused_turn_id_rejected() {
        let (s, outcomes) = run(vec![
            Action::PersonaIntroduced(persona("p1")),
            start("t1", "p1"),
            end("t1", "a"),
            start("t1", "p1"),
        ]);
        assert_eq!(s.turns.len(), 1);
        assert_eq!(outcomes[3], Outcome::Rejected(ProtocolViolation::DuplicateTurn("t1".into())));
    }

    #[test]
    fn test_admits_turn_matches_reducer_verdict() {
        let (s, _) = run(vec![Action::PersonaIntroduced(persona("p1")), start("t1", "p1")]);
        let ts = |turn: &str, who: &str| TurnStart {
            turn_id: turn.to_string(),
            persona_id: who.to_string(),
            persona_name: String::new(),
            phase: DebatePhase::Opening,
        };
        assert_eq!(admits_turn(&s, &ts("t2", "p1")), Ok(()));
        assert!(matches!(admits_turn(&s, &ts("t2", "ghost")), Err(ProtocolViolation::UnknownPersona { .. })));
        assert_eq!(admits_turn(&s, &ts("t1", "p1")), Err(ProtocolViolation::DuplicateTurn("t1".into())));
    }

    #[test]
    fn test_overlapping_start_force_closes_open_turn() {
        let (s, outcomes) = run(vec![
            Action::PhaseChanged(PhaseChange { phase: DebatePhase::Opening, description: String::new() }),
            Action::PersonaIntroduced(persona("p1")),
            Action::PersonaIntroduced(persona("p2")),
            start("t1", "p1"),
            token("t1", "Partial"),
            start("t2", "p2"),
        ]);
        assert_eq!(
            outcomes[5],
            Outcome::Recovered(ProtocolViolation::TurnStillOpen { open: "t1".into(), incoming: "t2".into() })
        );
        assert_eq!(s.turns.len(), 2);
        assert!(s.turns[0].is_complete);
        assert_eq!(s.turns[0].content, "Partial");
        assert!(!s.turns[1].is_complete);
        assert_eq!(s.current_speaker.as_ref().map(|sp| sp.persona_id.as_str()), Some("p2"));
    }

    #[test]
    fn test_complete_before_analysis() {
        let (s, _) = run(vec![Action::SimulationCompleted]);
        assert_eq!(s.status, SimulationStatus::Complete);
        assert!(s.analysis.is_none());
    }

    #[test]
    fn test_complete_keeps_speaker_while_turn_open() {
        let (s, _) = run(vec![
            Action::PersonaIntroduced(persona("p1")),
            start("t1", "p1"),
            Action::SimulationCompleted,
        ]);
        assert_eq!(s.status, SimulationStatus::Complete);
        assert!(s.current_speaker.is_some());
        let s = reduce(s, end("t1", "closing words")).state;
        assert!(s.current_speaker.is_none());
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_analysis_set_once() {
        let analysis = AnalysisResult {
            approval_score: 62.0,
            approval_label: "Uncertain".to_string(),
            approval_reasoning: String::new(),
            key_arguments: Vec::new(),
            recommended_rebuttals: Vec::new(),
            strongest_opposition_point: String::new(),
            weakest_opposition_point: String::new(),
            overall_assessment: String::new(),
        };
        let mut second = analysis.clone();
        second.approval_score = 10.0;
        let (s, outcomes) = run(vec![
            Action::AnalysisReceived(analysis),
            Action::AnalysisReceived(second),
        ]);
        assert_eq!(s.status, SimulationStatus::Analysis);
        assert_eq!(s.analysis.as_ref().map(|a| a.approval_score), Some(62.0));
        assert_eq!(outcomes[1], Outcome::Rejected(ProtocolViolation::AnalysisAlreadySet));
    }

    #[test]
    fn test_status_updates_agent_progress() {
        let (s, _) = run(vec![
            Action::StatusUpdated(StatusReport {
                message: "Analyzing uploaded document...".to_string(),
                agent_id: Some("document_analyzer".to_string()),
                agent_status: Some(crate::model::AgentState::Active),
                progress: None,
            }),
            Action::StatusUpdated(StatusReport {
                message: "Document processed".to_string(),
                agent_id: Some("document_analyzer".to_string()),
                agent_status: Some(crate::model::AgentState::Complete),
                progress: Some(0.25),
            }),
        ]);
        assert_eq!(s.agents.len(), 1);
        assert_eq!(s.agents[0].state, Some(crate::model::AgentState::Complete));
        assert_eq!(s.status_message, "Document processed");
        assert_eq!(s.progress, Some(0.25));
    }

    #[test]
    fn test_producer_error_is_terminal() {
        let (s, _) = run(vec![
            Action::SimulationErrored(ErrorReport { message: "Simulation failed: quota".to_string(), phase: None }),
            Action::PhaseChanged(PhaseChange { phase: DebatePhase::Rebuttal, description: String::new() }),
        ]);
        assert_eq!(s.status, SimulationStatus::Error);
        assert_eq!(s.error.as_deref(), Some("Simulation failed: quota"));
    }
}
