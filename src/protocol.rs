//! Wire protocol: the `{type, payload}` envelopes the simulation server
//! pushes over the WebSocket.
//!
//! Decoding is strict about shape and lenient about optional detail fields,
//! so that a producer adding fields never breaks a viewer.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::model::{AgentState, AnalysisResult, DebatePhase, Persona};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub phase: DebatePhase,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnStart {
    pub turn_id: String,
    pub persona_id: String,
    #[serde(default)]
    pub persona_name: String,
    pub phase: DebatePhase,
}

/// One streamed text fragment of an open turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenChunk {
    pub turn_id: String,
    pub token: String,
    #[serde(default)]
    pub persona_id: String,
}

/// End of a turn, carrying the authoritative text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEnd {
    pub turn_id: String,
    #[serde(default)]
    pub persona_id: String,
    pub full_text: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_status: Option<AgentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Completion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    PhaseChange(PhaseChange),
    PersonaIntro(Persona),
    SpeakingStart(TurnStart),
    Token(TokenChunk),
    SpeakingEnd(TurnEnd),
    Analysis(AnalysisResult),
    Complete(Completion),
    Status(StatusReport),
    Error(ErrorReport),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl InboundMessage {
    /// The wire `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::PhaseChange(_) => "phase_change",
            InboundMessage::PersonaIntro(_) => "persona_intro",
            InboundMessage::SpeakingStart(_) => "speaking_start",
            InboundMessage::Token(_) => "token",
            InboundMessage::SpeakingEnd(_) => "speaking_end",
            InboundMessage::Analysis(_) => "analysis",
            InboundMessage::Complete(_) => "complete",
            InboundMessage::Status(_) => "status",
            InboundMessage::Error(_) => "error",
        }
    }

    /// Decode one text frame.
    pub fn decode(raw: &str) -> Result<Self, SyncError> {
        let envelope: Envelope = serde_json::from_str(raw).map_err(SyncError::MalformedEnvelope)?;
        let kind = envelope.kind.as_str();
        let body = envelope.payload;

        let msg = match kind {
            "phase_change" => InboundMessage::PhaseChange(payload(kind, body)?),
            "persona_intro" => InboundMessage::PersonaIntro(payload(kind, body)?),
            "speaking_start" => InboundMessage::SpeakingStart(payload(kind, body)?),
            "token" => InboundMessage::Token(payload(kind, body)?),
            "speaking_end" => InboundMessage::SpeakingEnd(payload(kind, body)?),
            "analysis" => {
                let result: AnalysisResult = payload(kind, body)?;
                if !(0.0..=100.0).contains(&result.approval_score) {
                    return Err(SyncError::MalformedPayload {
                        kind: kind.to_string(),
                        source: serde_json::Error::custom(format!(
                            "approval_score {} outside 0..=100",
                            result.approval_score
                        )),
                    });
                }
                InboundMessage::Analysis(result)
            }
            "complete" => InboundMessage::Complete(payload(kind, body)?),
            "status" => InboundMessage::Status(payload(kind, body)?),
            "error" => InboundMessage::Error(payload(kind, body)?),
            other => return Err(SyncError::UnknownMessageType(other.to_string())),
        };
        Ok(msg)
    }

    /// Encode back into the wire envelope. Used by in-process producers.
    pub fn to_json(&self) -> Value {
        let payload = match self {
            InboundMessage::PhaseChange(p) => serde_json::to_value(p),
            InboundMessage::PersonaIntro(p) => serde_json::to_value(p),
            InboundMessage::SpeakingStart(p) => serde_json::to_value(p),
            InboundMessage::Token(p) => serde_json::to_value(p),
            InboundMessage::SpeakingEnd(p) => serde_json::to_value(p),
            InboundMessage::Analysis(p) => serde_json::to_value(p),
            InboundMessage::Complete(p) => serde_json::to_value(p),
            InboundMessage::Status(p) => serde_json::to_value(p),
            InboundMessage::Error(p) => serde_json::to_value(p),
        }
        .unwrap_or(Value::Null);
        serde_json::json!({ "type": self.kind(), "payload": payload })
    }

    pub fn encode(&self) -> String {
        self.to_json().to_string()
    }
}

/// Decode a payload. A missing or `null` payload is read as `{}` so that
/// bodiless messages such as `complete` still decode.
fn payload<T: DeserializeOwned>(kind: &str, body: Value) -> Result<T, SyncError> {
    let body = if body.is_null() { Value::Object(Map::new()) } else { body };
    serde_json::from_value(body).map_err(|source| SyncError::MalformedPayload {
        kind: kind.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"type":"phase_change","payload":{"phase":"opening","description":"Called to order"}}"#, "phase_change")]
    #[case(r#"{"type":"persona_intro","payload":{"id":"p1","name":"Ava","role":"moderator"}}"#, "persona_intro")]
    #[case(r#"{"type":"speaking_start","payload":{"turn_id":"t1","persona_id":"p1","persona_name":"Ava","phase":"opening"}}"#, "speaking_start")]
    #[case(r#"{"type":"token","payload":{"turn_id":"t1","token":"Hi","persona_id":"p1"}}"#, "token")]
    #[case(r#"{"type":"speaking_end","payload":{"turn_id":"t1","persona_id":"p1","full_text":"Hi."}}"#, "speaking_end")]
    #[case(r#"{"type":"analysis","payload":{"approval_score":62}}"#, "analysis")]
    #[case(r#"{"type":"complete","payload":{"simulation_id":"s1"}}"#, "complete")]
    #[case(r#"{"type":"complete"}"#, "complete")]
    #[case(r#"{"type":"status","payload":{"message":"Working","agent_id":"debate_analyst","agent_status":"active"}}"#, "status")]
    #[case(r#"{"type":"error","payload":{"message":"boom"}}"#, "error")]
    fn test_decode_known_types(#[case] raw: &str, #[case] kind: &str) {
        let msg = InboundMessage::decode(raw).expect("should decode");
        assert_eq!(msg.kind(), kind);
    }

    #[rstest]
    #[case("not json at all")]
    #[case(r#"{"payload":{}}"#)]
    #[case(r#"[1,2,3]"#)]
    fn test_decode_rejects_bad_envelope(#[case] raw: &str) {
        assert!(matches!(InboundMessage::decode(raw), Err(SyncError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = InboundMessage::decode(r#"{"type":"applause","payload":{}}"#).unwrap_err();
        assert!(matches!(err, SyncError::UnknownMessageType(ref t) if t == "applause"));
    }

    #[rstest]
    #[case(r#"{"type":"token","payload":{"turn_id":"t1"}}"#)]
    #[case(r#"{"type":"speaking_start","payload":{"turn_id":"t1","persona_id":"p1","phase":"recess"}}"#)]
    #[case(r#"{"type":"status","payload":{"message":"x","agent_status":"sleeping"}}"#)]
    #[case(r#"{"type":"analysis","payload":{"approval_score":140}}"#)]
    fn test_decode_rejects_bad_payload(#[case] raw: &str) {
        assert!(matches!(
            InboundMessage::decode(raw),
            Err(SyncError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_status_optional_fields() {
        let msg = InboundMessage::decode(
            r#"{"type":"status","payload":{"message":"Generating personas","progress":0.4}}"#,
        )
        .unwrap();
        match msg {
            InboundMessage::Status(s) => {
                assert_eq!(s.message, "Generating personas");
                assert_eq!(s.progress, Some(0.4));
                assert!(s.agent_id.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_encode_produces_decodable_envelope() {
        let msg = InboundMessage::Token(TokenChunk {
            turn_id: "t9".to_string(),
            token: " council".to_string(),
            persona_id: "p2".to_string(),
        });
        let json = msg.to_json();
        assert_eq!(json["type"], "token");
        assert_eq!(json["payload"]["token"], " council");
        assert_eq!(InboundMessage::decode(&msg.encode()).unwrap(), msg);
    }
}
