//! Plain-text and Markdown renderings of a finished (or in-progress)
//! transcript.

use crate::model::{DebatePhase, SimulationSnapshot};

/// Transcript grouped by phase, one block per turn.
///
/// Only complete turns are included; a turn still streaming is not part of
/// the record yet.
pub fn full_text(snapshot: &SimulationSnapshot) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current: Option<DebatePhase> = None;

    for turn in snapshot.completed_turns() {
        if current != Some(turn.phase) {
            current = Some(turn.phase);
            lines.push(format!("\n--- {} ---\n", turn.phase.title()));
        }
        let role = snapshot
            .persona(&turn.persona_id)
            .map(|p| p.role.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        lines.push(format!("{} ({}):", turn.persona_name, role));
        lines.push(format!("  {}", turn.content));
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Markdown export with a participants list and, when present, the analysis.
pub fn to_markdown(snapshot: &SimulationSnapshot, city_name: Option<&str>) -> String {
    let mut md: Vec<String> = vec!["# Council Simulator - Meeting Transcript".to_string(), String::new()];

    if let Some(city) = city_name.filter(|c| !c.is_empty()) {
        md.push(format!("**City:** {city}"));
        md.push(String::new());
    }

    if !snapshot.personas.is_empty() {
        md.push("## Participants".to_string());
        for p in &snapshot.personas {
            if p.occupation.is_empty() {
                md.push(format!("- **{}** ({})", p.name, p.role));
            } else {
                md.push(format!("- **{}** ({}, {})", p.name, p.role, p.occupation));
            }
        }
        md.push(String::new());
    }

    md.push("## Transcript".to_string());
    md.push(full_text(snapshot));

    if let Some(analysis) = &snapshot.analysis {
        md.push("## Analysis".to_string());
        md.push(format!(
            "**Approval likelihood:** {:.0}/100 ({})",
            analysis.approval_score, analysis.approval_label
        ));
        if !analysis.approval_reasoning.is_empty() {
            md.push(String::new());
            md.push(analysis.approval_reasoning.clone());
        }
        if !analysis.recommended_rebuttals.is_empty() {
            md.push(String::new());
            md.push("### Recommended rebuttals".to_string());
            for r in &analysis.recommended_rebuttals {
                md.push(format!("- **{}**: {} _({})_", r.concern, r.rebuttal, r.effectiveness));
            }
        }
        if !analysis.overall_assessment.is_empty() {
            md.push(String::new());
            md.push(analysis.overall_assessment.clone());
        }
    }

    md.join("\n")
}
