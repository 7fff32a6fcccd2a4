use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use colored::*;
use council_sync::cli::Args;
use council_sync::model::{AgentState, SimulationSnapshot, SimulationStatus, TranscriptTurn};
use council_sync::{transcript, DebatePhase, NarrationTracker, Session};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// How long to keep listening for the analysis once `complete` arrived
/// without one.
const ANALYSIS_GRACE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Console renderer
// ---------------------------------------------------------------------------

/// Turns successive snapshots into terminal output without repeating itself.
struct Console {
    tracker: NarrationTracker,
    quiet: bool,
    phase: Option<DebatePhase>,
    status_message: String,
    /// Turn currently being echoed live and how many bytes of it are printed.
    echo: Option<(String, usize)>,
}

impl Console {
    fn new(quiet: bool) -> Self {
        Self { tracker: NarrationTracker::new(), quiet, phase: None, status_message: String::new(), echo: None }
    }

    fn render(&mut self, snap: &SimulationSnapshot) -> io::Result<()> {
        let mut out = io::stdout().lock();

        if let Some(phase) = snap.phase.filter(|p| self.phase != Some(*p)) {
            self.phase = Some(phase);
            self.end_echo(&mut out)?;
            writeln!(out, "\n{}", format!("=== {} ===", phase.title()).bold())?;
            if let Some(desc) = snap.phase_description.as_deref().filter(|d| !d.is_empty()) {
                writeln!(out, "{}", desc.dimmed())?;
            }
        }

        if !snap.status_message.is_empty() && snap.status_message != self.status_message {
            self.status_message = snap.status_message.clone();
            self.end_echo(&mut out)?;
            let pct = snap.progress.map(|p| format!(" [{:.0}%]", p * 100.0)).unwrap_or_default();
            writeln!(out, "{} {}{}", "·".dimmed(), snap.status_message.dimmed(), pct.dimmed())?;
            for agent in &snap.agents {
                if agent.state == Some(AgentState::Active) {
                    writeln!(out, "    {} {}", agent.agent_id.cyan(), agent.message)?;
                }
            }
        }

        if !self.quiet {
            if let Some(open) = snap.open_turn() {
                self.echo_open(&mut out, snap, open)?;
            }
        }

        for turn in self.tracker.observe(snap) {
            self.print_finalized(&mut out, snap, &turn)?;
        }

        if snap.status == SimulationStatus::Complete && snap.analysis.is_some() {
            self.end_echo(&mut out)?;
        }
        out.flush()
    }

    fn echo_open(&mut self, out: &mut impl Write, snap: &SimulationSnapshot, open: &TranscriptTurn) -> io::Result<()> {
        let printed = match &self.echo {
            Some((turn_id, printed)) if *turn_id == open.turn_id => *printed,
            _ => {
                self.end_echo(out)?;
                write!(out, "{}: ", speaker_label(snap, open))?;
                0
            }
        };
        // Content only grows while a turn is open.
        if let Some(fresh) = open.content.get(printed..) {
            write!(out, "{fresh}")?;
        }
        self.echo = Some((open.turn_id.clone(), open.content.len()));
        Ok(())
    }

    fn print_finalized(&mut self, out: &mut impl Write, snap: &SimulationSnapshot, turn: &TranscriptTurn) -> io::Result<()> {
        let was_echoing = matches!(&self.echo, Some((id, _)) if *id == turn.turn_id);
        if was_echoing {
            // The finalized text replaces what was streamed; only reprint when it differs.
            let streamed = self.echo.take().map(|(_, n)| n).unwrap_or(0);
            if turn.content.len() == streamed {
                return writeln!(out);
            }
            writeln!(out, " {}", "(revised)".dimmed())?;
        } else {
            self.end_echo(out)?;
        }
        writeln!(out, "{}: {}", speaker_label(snap, turn), turn.content)
    }

    fn end_echo(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.echo.take().is_some() {
            writeln!(out)?;
        }
        Ok(())
    }
}

fn speaker_label(snap: &SimulationSnapshot, turn: &TranscriptTurn) -> ColoredString {
    match snap.persona(&turn.persona_id).and_then(|p| parse_hex(&p.color)) {
        Some((r, g, b)) => turn.persona_name.truecolor(r, g, b).bold(),
        None => turn.persona_name.bold(),
    }
}

/// `#rrggbb` to an RGB triple.
fn parse_hex(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// Whether the viewer still has something to wait for. The server keeps the
/// socket open after `complete`/`error`, so the end is read off the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Running,
    /// Complete, but the analysis has not arrived yet.
    AwaitingAnalysis,
    Finished,
}

fn progress(snap: &SimulationSnapshot) -> Progress {
    if !snap.status.is_terminal() || snap.open_turn().is_some() {
        return Progress::Running;
    }
    if snap.status == SimulationStatus::Complete && snap.analysis.is_none() {
        return Progress::AwaitingAnalysis;
    }
    Progress::Finished
}

fn print_summary(snap: &SimulationSnapshot) {
    if let Some(analysis) = &snap.analysis {
        println!(
            "\n{} {:.0}/100 ({})",
            "Approval likelihood:".bold(),
            analysis.approval_score,
            analysis.approval_label
        );
        if !analysis.overall_assessment.is_empty() {
            println!("{}", analysis.overall_assessment);
        }
    }
    println!(
        "{}",
        format!("{} turns, status {:?}, connection {:?}", snap.completed_turns().count(), snap.status, snap.connection)
            .dimmed()
    );
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("council_sync=info")))
        .with_writer(io::stderr)
        .init();

    if args.no_color {
        colored::control::set_override(false);
    }

    let config = args.resolve_config()?;
    let mut session = Session::connect(&config, &args.simulation_id);
    tracing::info!(session = %session.session_id(), endpoint = %config.simulation_endpoint(&args.simulation_id), "watching");

    let mut console = Console::new(args.quiet);
    let mut snapshots = session.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let grace = tokio::time::sleep(ANALYSIS_GRACE);
    tokio::pin!(grace);
    let mut grace_armed = false;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = snapshots.borrow_and_update().clone();
                console.render(&snap)?;
                match progress(&snap) {
                    Progress::Finished => break,
                    Progress::AwaitingAnalysis if !grace_armed => {
                        grace.as_mut().reset(Instant::now() + ANALYSIS_GRACE);
                        grace_armed = true;
                    }
                    _ => {}
                }
            }
            _ = &mut grace, if grace_armed => {
                tracing::warn!("no analysis received after completion");
                break;
            }
            _ = &mut ctrl_c => {
                eprintln!("\n{}", "interrupted".yellow());
                break;
            }
        }
    }

    let last = match session.teardown().await {
        Some(snap) => snap,
        None => session.snapshot(),
    };
    console.render(&last)?;
    print_summary(&last);

    if let Some(path) = &args.markdown {
        std::fs::write(path, transcript::to_markdown(&last, args.city.as_deref()))?;
        eprintln!("{} {}", "transcript written to".green(), path.display());
    }

    match (&last.status, &last.error) {
        (SimulationStatus::Error, Some(message)) => Err(format!("simulation failed: {message}").into()),
        (SimulationStatus::Error, None) => Err("simulation failed".into()),
        _ => Ok(()),
    }
}
