//! Transcript data model: personas, turns, analysis, and the aggregate
//! [`SimulationSnapshot`] that the reducer maintains.
//!
//! Everything here is plain data. The only behaviour is lookup helpers and
//! [`SimulationSnapshot::check_invariants`], which tests run after every
//! reduction.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// A named stage of the hearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    Opening,
    PublicComment,
    Rebuttal,
    CouncilQa,
    Deliberation,
}

impl DebatePhase {
    /// Wire name, e.g. `public_comment`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DebatePhase::Opening => "opening",
            DebatePhase::PublicComment => "public_comment",
            DebatePhase::Rebuttal => "rebuttal",
            DebatePhase::CouncilQa => "council_qa",
            DebatePhase::Deliberation => "deliberation",
        }
    }

    /// Human-readable title used in transcript headers.
    pub fn title(&self) -> &'static str {
        match self {
            DebatePhase::Opening => "Opening Statements",
            DebatePhase::PublicComment => "Public Comment Period",
            DebatePhase::Rebuttal => "Petitioner Rebuttal",
            DebatePhase::CouncilQa => "Council Questions & Answers",
            DebatePhase::Deliberation => "Deliberation & Vote",
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaRole {
    Moderator,
    Petitioner,
    CouncilMember,
    Resident,
}

impl std::fmt::Display for PersonaRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PersonaRole::Moderator => "moderator",
            PersonaRole::Petitioner => "petitioner",
            PersonaRole::CouncilMember => "council_member",
            PersonaRole::Resident => "resident",
        };
        f.write_str(s)
    }
}

/// Transport-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Overall simulation progress as reported by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Setup,
    GeneratingPersonas,
    Opening,
    PublicComment,
    Rebuttal,
    CouncilQa,
    Deliberation,
    Analysis,
    Complete,
    Error,
}

impl SimulationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SimulationStatus::Complete | SimulationStatus::Error)
    }
}

impl From<DebatePhase> for SimulationStatus {
    fn from(phase: DebatePhase) -> Self {
        match phase {
            DebatePhase::Opening => SimulationStatus::Opening,
            DebatePhase::PublicComment => SimulationStatus::PublicComment,
            DebatePhase::Rebuttal => SimulationStatus::Rebuttal,
            DebatePhase::CouncilQa => SimulationStatus::CouncilQa,
            DebatePhase::Deliberation => SimulationStatus::Deliberation,
        }
    }
}

/// Progress state of one of the producer's background agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Active,
    Complete,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn default_intensity() -> u8 {
    5
}

fn default_color() -> String {
    "#6366f1".to_string()
}

/// A debate participant. Everything past `role` is display payload the
/// engine stores but never interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub role: PersonaRole,
    #[serde(default)]
    pub archetype: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub speaking_style: String,
    #[serde(default)]
    pub primary_concern: String,
    #[serde(default)]
    pub secondary_concerns: Vec<String>,
    /// How strongly the persona feels, 1-10.
    #[serde(default = "default_intensity")]
    pub intensity: u8,
    #[serde(default = "default_color")]
    pub color: String,
}

/// One contiguous utterance by a single persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub turn_id: String,
    pub persona_id: String,
    pub persona_name: String,
    pub phase: DebatePhase,
    pub content: String,
    pub is_complete: bool,
}

/// Pointer to the turn currently being spoken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub turn_id: String,
    pub persona_id: String,
    pub persona_name: String,
}

/// Latest progress line reported for one background agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProgress {
    pub agent_id: String,
    pub state: Option<AgentState>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSummary {
    /// `opposition` or `petitioner`.
    pub side: String,
    pub argument: String,
    /// `strong`, `moderate` or `weak`.
    pub strength: String,
    #[serde(default)]
    pub relevant_data: String,
}

fn default_effectiveness() -> String {
    "moderate".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedRebuttal {
    pub concern: String,
    pub rebuttal: String,
    #[serde(default)]
    pub supporting_data: String,
    #[serde(default = "default_effectiveness")]
    pub effectiveness: String,
}

/// Post-debate scoring, computed upstream and stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Likelihood of approval, 0-100.
    pub approval_score: f64,
    #[serde(default)]
    pub approval_label: String,
    #[serde(default)]
    pub approval_reasoning: String,
    #[serde(default)]
    pub key_arguments: Vec<ArgumentSummary>,
    #[serde(default)]
    pub recommended_rebuttals: Vec<RecommendedRebuttal>,
    #[serde(default)]
    pub strongest_opposition_point: String,
    #[serde(default)]
    pub weakest_opposition_point: String,
    #[serde(default)]
    pub overall_assessment: String,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The externally observed state of one simulation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    /// Bumped on every reduction that changed state.
    pub revision: u64,
    pub connection: ConnectionStatus,
    pub phase: Option<DebatePhase>,
    pub phase_description: Option<String>,
    pub current_speaker: Option<Speaker>,
    pub turns: Vec<TranscriptTurn>,
    pub personas: Vec<Persona>,
    pub analysis: Option<AnalysisResult>,
    pub status_message: String,
    pub agents: Vec<AgentProgress>,
    pub progress: Option<f64>,
    pub status: SimulationStatus,
    pub error: Option<String>,
}

impl Default for SimulationSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationSnapshot {
    pub fn new() -> Self {
        Self {
            revision: 0,
            connection: ConnectionStatus::Connecting,
            phase: None,
            phase_description: None,
            current_speaker: None,
            turns: Vec::new(),
            personas: Vec::new(),
            analysis: None,
            status_message: String::new(),
            agents: Vec::new(),
            progress: None,
            status: SimulationStatus::Setup,
            error: None,
        }
    }

    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn turn(&self, turn_id: &str) -> Option<&TranscriptTurn> {
        self.turns.iter().find(|t| t.turn_id == turn_id)
    }

    /// The single turn that is still being spoken, if any.
    pub fn open_turn(&self) -> Option<&TranscriptTurn> {
        self.turns.iter().rev().find(|t| !t.is_complete)
    }

    pub fn completed_turns(&self) -> impl Iterator<Item = &TranscriptTurn> {
        self.turns.iter().filter(|t| t.is_complete)
    }

    /// Verify the transcript invariants. Returns the first breach found.
    pub fn check_invariants(&self) -> Result<(), InvariantBreach> {
        let open: Vec<&TranscriptTurn> = self.turns.iter().filter(|t| !t.is_complete).collect();
        if open.len() > 1 {
            return Err(InvariantBreach::MultipleOpenTurns(open.len()));
        }

        match (open.first(), &self.current_speaker) {
            (None, None) => {}
            (Some(turn), Some(speaker)) => {
                if turn.turn_id != speaker.turn_id || turn.persona_id != speaker.persona_id {
                    return Err(InvariantBreach::SpeakerMismatch {
                        turn_id: turn.turn_id.clone(),
                        speaker_turn_id: speaker.turn_id.clone(),
                    });
                }
            }
            (Some(turn), None) => {
                return Err(InvariantBreach::OpenTurnWithoutSpeaker(turn.turn_id.clone()))
            }
            (None, Some(speaker)) => {
                return Err(InvariantBreach::SpeakerWithoutOpenTurn(speaker.turn_id.clone()))
            }
        }

        for (i, turn) in self.turns.iter().enumerate() {
            if self.turns[..i].iter().any(|t| t.turn_id == turn.turn_id) {
                return Err(InvariantBreach::DuplicateTurnId(turn.turn_id.clone()));
            }
        }

        for (i, persona) in self.personas.iter().enumerate() {
            if self.personas[..i].iter().any(|p| p.id == persona.id) {
                return Err(InvariantBreach::DuplicatePersonaId(persona.id.clone()));
            }
        }

        Ok(())
    }
}

/// A violated snapshot invariant. Only ever produced by a reducer bug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantBreach {
    #[error("{0} turns are open at once")]
    MultipleOpenTurns(usize),
    #[error("open turn {turn_id} does not match current speaker {speaker_turn_id}")]
    SpeakerMismatch { turn_id: String, speaker_turn_id: String },
    #[error("turn {0} is open but no speaker is set")]
    OpenTurnWithoutSpeaker(String),
    #[error("speaker points at {0} but no turn is open")]
    SpeakerWithoutOpenTurn(String),
    #[error("turn id {0} appears twice")]
    DuplicateTurnId(String),
    #[error("persona id {0} appears twice")]
    DuplicatePersonaId(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
