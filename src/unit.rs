//! Executable units — the smallest schedulable items.
//!
//! A unit is pure data, created by the state machine per decision and
//! immutable once constructed. Side effects happen only inside the
//! `UnitRunner` that executes it, which keeps the decision tables pure
//! and directly testable.

use crate::cancel::CancelToken;
use crate::clock::ShowClock;
use crate::context::BroadcastState;
use crate::sources::{AdSpot, DialogueLine, TranscriptSink};
use crate::transcript::TranscriptEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The kind of schedulable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    Music,
    HostLine,
    CallerLine,
    Conversation,
    Ad,
    DeadAir,
    Transition,
    PutCallerOnAir,
    Wait,
}

/// The decision that produced a unit. `advance()` keys on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRole {
    ShowStart,
    IntroTheme,
    OpeningLine,
    ClosingLine,
    BreakTransitionLine,
    OffTopicRemark,
    CallerArc,
    PutCallerOnAir,
    FillerLine,
    BetweenCallersLine,
    AdSlot,
    BreakPadding,
    BreakBumper,
    ReturnLine,
    DroppedCallerLine,
    CursedLine,
    CursingDelay,
    WaitForBreak,
    WaitForShowEnd,
}

/// How a unit's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// The run failed; logged and treated as completed, never retried.
    Failed,
    /// The run exceeded the execution ceiling and was left behind.
    Abandoned,
}

static UNIT_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_unit_id(slug: &str) -> String {
    let n = UNIT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", slug, n)
}

/// One atomic thing the broadcast can do.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    /// Unique per instance, not globally meaningful.
    pub id: String,
    pub kind: UnitKind,
    pub role: UnitRole,
    /// The state the machine was in when it emitted this unit.
    pub phase: BroadcastState,
    /// When false, the unit runs detached on a worker so the driver is
    /// not blocked waiting for content duration.
    pub requires_sync_await: bool,
    pub speaker: Option<String>,
    pub text: Option<String>,
    pub duration_secs: f64,
    pub ad_slot: Option<usize>,
}

impl ExecutableUnit {
    /// A spoken host or caller line.
    pub fn line(role: UnitRole, kind: UnitKind, phase: BroadcastState, line: DialogueLine) -> Self {
        ExecutableUnit {
            id: next_unit_id("line"),
            kind,
            role,
            phase,
            requires_sync_await: true,
            speaker: Some(line.speaker),
            text: Some(line.text),
            duration_secs: line.duration_secs,
            ad_slot: None,
        }
    }

    /// A music bed or bumper.
    pub fn music(role: UnitRole, phase: BroadcastState, label: &str, duration_secs: f64) -> Self {
        ExecutableUnit {
            id: next_unit_id("music"),
            kind: UnitKind::Music,
            role,
            phase,
            requires_sync_await: true,
            speaker: None,
            text: Some(label.to_string()),
            duration_secs,
            ad_slot: None,
        }
    }

    /// A short scripted transition (stingers, show open).
    pub fn transition(role: UnitRole, phase: BroadcastState, label: &str, duration_secs: f64) -> Self {
        ExecutableUnit {
            id: next_unit_id("transition"),
            kind: UnitKind::Transition,
            role,
            phase,
            requires_sync_await: true,
            speaker: None,
            text: Some(label.to_string()),
            duration_secs,
            ad_slot: None,
        }
    }

    /// A bounded wait.
    pub fn wait(role: UnitRole, phase: BroadcastState, duration_secs: f64) -> Self {
        ExecutableUnit {
            id: next_unit_id("wait"),
            kind: UnitKind::Wait,
            role,
            phase,
            requires_sync_await: true,
            speaker: None,
            text: None,
            duration_secs,
            ad_slot: None,
        }
    }

    /// One advertisement spot.
    pub fn ad(phase: BroadcastState, slot: usize, spot: AdSpot) -> Self {
        ExecutableUnit {
            id: next_unit_id("ad"),
            kind: UnitKind::Ad,
            role: UnitRole::AdSlot,
            phase,
            requires_sync_await: true,
            speaker: Some("ad".to_string()),
            text: Some(spot.name),
            duration_secs: spot.duration_secs,
            ad_slot: Some(slot),
        }
    }

    /// Promote the next on-hold caller. Pure side effect, no content
    /// duration, so the driver does not wait on it.
    pub fn put_caller_on_air(phase: BroadcastState) -> Self {
        ExecutableUnit {
            id: next_unit_id("put-on-air"),
            kind: UnitKind::PutCallerOnAir,
            role: UnitRole::PutCallerOnAir,
            phase,
            requires_sync_await: false,
            speaker: None,
            text: None,
            duration_secs: 0.0,
            ad_slot: None,
        }
    }

    /// An on-air conversation arc with the current caller.
    pub fn caller_arc(phase: BroadcastState, name: &str, topic: &str, arc_secs: f64) -> Self {
        ExecutableUnit {
            id: next_unit_id("caller"),
            kind: UnitKind::Conversation,
            role: UnitRole::CallerArc,
            phase,
            requires_sync_await: true,
            speaker: Some(name.to_string()),
            text: Some(format!("(on-air conversation about {})", topic)),
            duration_secs: arc_secs,
            ad_slot: None,
        }
    }
}

/// Executes units. `run` must respect the cancel token and return
/// promptly once it fires; `cleanup` must be idempotent — it is called
/// once after every run and again defensively when the unit is
/// superseded or the loop shuts down.
pub trait UnitRunner: Send + Sync {
    fn run(&self, unit: &ExecutableUnit, cancel: &CancelToken) -> Result<RunOutcome, String>;

    fn cleanup(&self, _unit: &ExecutableUnit) {}
}

/// Default runner for the simulator: writes content to the transcript
/// and waits out the unit's duration, scaled by `time_scale` so demos
/// and tests can run faster than real time.
pub struct SimRunner {
    transcript: Arc<dyn TranscriptSink>,
    clock: Arc<dyn ShowClock>,
    time_scale: f64,
}

impl SimRunner {
    pub fn new(transcript: Arc<dyn TranscriptSink>, clock: Arc<dyn ShowClock>) -> Self {
        Self::with_time_scale(transcript, clock, 1.0)
    }

    pub fn with_time_scale(
        transcript: Arc<dyn TranscriptSink>,
        clock: Arc<dyn ShowClock>,
        time_scale: f64,
    ) -> Self {
        SimRunner {
            transcript,
            clock,
            time_scale: time_scale.max(0.0),
        }
    }
}

impl UnitRunner for SimRunner {
    fn run(&self, unit: &ExecutableUnit, cancel: &CancelToken) -> Result<RunOutcome, String> {
        if let Some(text) = &unit.text {
            let speaker = unit.speaker.as_deref().unwrap_or("studio");
            self.transcript.append(TranscriptEntry::new(
                speaker,
                text,
                unit.phase,
                self.clock.elapsed_secs(),
            ));
        }
        let scaled = unit.duration_secs.max(0.0) * self.time_scale;
        if scaled > 0.0 {
            if !cancel.wait(Duration::from_secs_f64(scaled)) {
                return Ok(RunOutcome::Cancelled);
            }
        }
        Ok(RunOutcome::Completed)
    }
}
