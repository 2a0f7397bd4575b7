//! Timer service — show-end and break-warning countdowns.
//!
//! A small state machine of its own (Inactive ⇄ ShowActive) over a set of
//! armed countdowns, all measured against the show clock. The service is
//! not thread-safe by itself; it is owned by the timer runtime thread and
//! mutated only through the operation queue (see `timer_queue`).

use crate::clock::ShowClock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Smallest duration a countdown may be armed with. Zero or negative
/// requests are coerced up to this so they still fire promptly, in order.
pub const MIN_TIMER_SECS: f64 = 0.01;

/// Break warnings armed relative to the break start, most urgent last.
pub const BREAK_WARNING_OFFSETS: [(TimingEventKind, f64); 4] = [
    (TimingEventKind::Break20s, 20.0),
    (TimingEventKind::Break10s, 10.0),
    (TimingEventKind::Break5s, 5.0),
    (TimingEventKind::Break0s, 0.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimingEventKind {
    Break20s,
    Break10s,
    Break5s,
    Break0s,
    ShowEnd,
    AdBreakStart,
    AdBreakEnd,
}

impl fmt::Display for TimingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimingEventKind::Break20s => "break-20s",
            TimingEventKind::Break10s => "break-10s",
            TimingEventKind::Break5s => "break-5s",
            TimingEventKind::Break0s => "break-0s",
            TimingEventKind::ShowEnd => "show-end",
            TimingEventKind::AdBreakStart => "ad-break-start",
            TimingEventKind::AdBreakEnd => "ad-break-end",
        };
        write!(f, "{}", name)
    }
}

/// Fire-once notification at an absolute show-clock offset.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingEvent {
    pub kind: TimingEventKind,
    /// Show-clock offset (seconds) the countdown targeted.
    pub at_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Inactive,
    ShowActive,
}

#[derive(Debug, Clone)]
struct Countdown {
    kind: TimingEventKind,
    fire_at: f64,
}

pub struct TimerService {
    clock: Arc<dyn ShowClock>,
    state: TimerState,
    countdowns: Vec<Countdown>,
}

impl TimerService {
    pub fn new(clock: Arc<dyn ShowClock>) -> Self {
        TimerService {
            clock,
            state: TimerState::Inactive,
            countdowns: Vec::new(),
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TimerState::ShowActive
    }

    /// Arm the show-end countdown and enter ShowActive.
    /// Starting while already active is a logged no-op.
    pub fn start_show(&mut self, duration_secs: f64) {
        if self.state == TimerState::ShowActive {
            eprintln!("[Timer] start_show ignored: show already active");
            return;
        }
        self.state = TimerState::ShowActive;
        let fire_at = self.clock.elapsed_secs() + duration_secs.max(MIN_TIMER_SECS);
        self.arm(TimingEventKind::ShowEnd, fire_at);
    }

    /// Disarm everything and return to Inactive.
    /// Stopping while inactive is a logged no-op.
    pub fn stop_show(&mut self) {
        if self.state == TimerState::Inactive {
            eprintln!("[Timer] stop_show ignored: no show active");
            return;
        }
        self.state = TimerState::Inactive;
        self.countdowns.clear();
    }

    /// Arm the four break warnings at T-20/T-10/T-5/T-0 relative to a
    /// break starting `secs_from_now` seconds from the current show-clock
    /// reading. Warnings whose target has already passed are skipped.
    pub fn schedule_break_warnings(&mut self, secs_from_now: f64) {
        let now = self.clock.elapsed_secs();
        let break_at = now + secs_from_now.max(0.0);
        for (kind, offset) in BREAK_WARNING_OFFSETS {
            let remaining = break_at - offset - now;
            if remaining < 0.0 {
                continue; // already passed
            }
            self.arm(kind, now + remaining.max(MIN_TIMER_SECS));
        }
    }

    /// Fire an immediate start notification and arm the matching end
    /// countdown. Returns the events to publish now.
    pub fn start_ad_break(&mut self, duration_secs: f64) -> Vec<TimingEvent> {
        let now = self.clock.elapsed_secs();
        self.arm(
            TimingEventKind::AdBreakEnd,
            now + duration_secs.max(MIN_TIMER_SECS),
        );
        vec![TimingEvent {
            kind: TimingEventKind::AdBreakStart,
            at_secs: now,
        }]
    }

    /// Fire an immediate end notification and disarm any pending
    /// ad-break-end countdown.
    pub fn stop_ad_break(&mut self) -> Vec<TimingEvent> {
        self.countdowns
            .retain(|c| c.kind != TimingEventKind::AdBreakEnd);
        vec![TimingEvent {
            kind: TimingEventKind::AdBreakEnd,
            at_secs: self.clock.elapsed_secs(),
        }]
    }

    /// Seconds until the next armed countdown of `kind`, if any.
    pub fn time_until(&self, kind: TimingEventKind) -> Option<f64> {
        let now = self.clock.elapsed_secs();
        self.countdowns
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| (c.fire_at - now).max(0.0))
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }

    /// Fire every due countdown. Countdowns reaching their target while
    /// the service is Inactive are suppressed, except ShowEnd (defense
    /// against stale timers must not swallow the show's end).
    pub fn tick(&mut self) -> Vec<TimingEvent> {
        let now = self.clock.elapsed_secs();
        let mut due: Vec<Countdown> = Vec::new();
        self.countdowns.retain(|c| {
            if c.fire_at <= now {
                due.push(c.clone());
                false
            } else {
                true
            }
        });
        // Deterministic order: by target time, then by descending urgency
        // (the enum declares warnings most-urgent-last).
        due.sort_by(|a, b| {
            a.fire_at
                .partial_cmp(&b.fire_at)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then((a.kind as u8).cmp(&(b.kind as u8)))
        });
        due.into_iter()
            .filter(|c| self.state == TimerState::ShowActive || c.kind == TimingEventKind::ShowEnd)
            .map(|c| TimingEvent {
                kind: c.kind,
                at_secs: c.fire_at,
            })
            .collect()
    }

    fn arm(&mut self, kind: TimingEventKind, fire_at: f64) {
        self.countdowns.push(Countdown { kind, fire_at });
    }

    #[cfg(test)]
    fn armed_count(&self) -> usize {
        self.countdowns.len()
    }
}
