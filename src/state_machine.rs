//! The broadcast state machine.
//!
//! Pure decision core: `next()` inspects the current state, the pending
//! flags, and the injected sources, and emits at most one executable
//! unit; `advance()` applies the transition for a finished unit. Neither
//! performs any waiting itself, which keeps every transition directly
//! testable without threads. Side notices for other subsystems (dead-air
//! edges, ad-break boundaries) accumulate in a queue the loop drains
//! after each call.

use crate::clock::ShowClock;
use crate::config::ShowTuning;
use crate::context::{BroadcastState, ShowContext};
use crate::dialogue::fallback_line;
use crate::sources::{AdSource, CallerSource, DialogueSource, LineCategory};
use crate::unit::{ExecutableUnit, UnitKind, UnitRole};
use std::sync::Arc;

/// Out-of-band facts the loop forwards to observers and the timer.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineNotice {
    DeadAirStarted,
    DeadAirEnded,
    AdBreakEntered { estimated_secs: f64 },
    AdBreakExited,
}

pub struct StateMachine {
    state: BroadcastState,
    ctx: ShowContext,
    callers: Arc<dyn CallerSource>,
    ads: Arc<dyn AdSource>,
    dialogue: Arc<dyn DialogueSource>,
    clock: Arc<dyn ShowClock>,
    tuning: ShowTuning,
    notices: Vec<MachineNotice>,
}

impl StateMachine {
    pub fn new(
        callers: Arc<dyn CallerSource>,
        ads: Arc<dyn AdSource>,
        dialogue: Arc<dyn DialogueSource>,
        clock: Arc<dyn ShowClock>,
        tuning: ShowTuning,
    ) -> Self {
        StateMachine {
            state: BroadcastState::Idle,
            ctx: ShowContext::default(),
            callers,
            ads,
            dialogue,
            clock,
            tuning,
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> BroadcastState {
        self.state
    }

    pub fn context(&self) -> &ShowContext {
        &self.ctx
    }

    /// Drain accumulated notices, oldest first.
    pub fn take_notices(&mut self) -> Vec<MachineNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Leave Idle and begin a show of the given length.
    pub fn begin_show(&mut self, duration_secs: f64) {
        if self.state != BroadcastState::Idle {
            eprintln!("[Show] begin_show ignored: already in {}", self.state);
            return;
        }
        self.ctx = ShowContext::new(duration_secs);
        self.set_state(BroadcastState::ShowStarting);
    }

    // ── Pending flags (set from the loop, consumed in transitions) ──────

    pub fn note_break_imminent(&mut self) {
        self.ctx.set_pending_break_transition();
    }

    pub fn note_show_ending(&mut self) {
        self.ctx.set_pending_show_ending();
    }

    pub fn note_caller_dropped(&mut self) {
        self.ctx.set_pending_caller_drop();
    }

    pub fn note_caller_cursed(&mut self) {
        self.ctx.set_pending_caller_curse();
    }

    // ── Decision ────────────────────────────────────────────────────────

    /// Decide the next unit to execute. None from a terminal state, or
    /// when the machine momentarily has nothing to emit.
    pub fn next(&mut self) -> Option<ExecutableUnit> {
        if self.state.is_terminal() {
            return None;
        }
        // Pending overrides apply everywhere except inside a committed
        // break, where the break must finish first. Show ending outranks
        // the break transition.
        if !self.state.in_committed_break() {
            if self.ctx.pending_show_ending() {
                return Some(self.host_line(UnitRole::ClosingLine, LineCategory::Closing));
            }
            if self.ctx.pending_break_transition() {
                return Some(self.host_line(UnitRole::BreakTransitionLine, LineCategory::BreakTransition));
            }
        }
        match self.state {
            BroadcastState::ShowStarting => Some(ExecutableUnit::transition(
                UnitRole::ShowStart,
                self.state,
                "show open",
                self.tuning.show_start_secs,
            )),
            BroadcastState::IntroMusic => Some(ExecutableUnit::music(
                UnitRole::IntroTheme,
                self.state,
                "intro theme",
                self.tuning.intro_music_secs,
            )),
            BroadcastState::Conversation => {
                if self.ctx.off_topic_remark_queued() {
                    Some(self.host_line(UnitRole::OffTopicRemark, LineCategory::OffTopicRemark))
                } else if !self.ctx.has_played_opening {
                    Some(self.host_line(UnitRole::OpeningLine, LineCategory::Opening))
                } else if let Some(caller) = self.callers.on_air() {
                    Some(ExecutableUnit::caller_arc(
                        self.state,
                        &caller.name,
                        &caller.topic,
                        caller.arc_secs,
                    ))
                } else if self.callers.on_hold_count() > 0 {
                    Some(ExecutableUnit::put_caller_on_air(self.state))
                } else {
                    Some(self.host_line(UnitRole::FillerLine, LineCategory::DeadAirFiller))
                }
            }
            BroadcastState::BetweenCallers => {
                Some(self.host_line(UnitRole::BetweenCallersLine, LineCategory::BetweenCallers))
            }
            BroadcastState::DeadAir => {
                let mut unit = self.host_line(UnitRole::FillerLine, LineCategory::DeadAirFiller);
                unit.kind = UnitKind::DeadAir;
                Some(unit)
            }
            BroadcastState::AdBreak => Some(self.next_ad_unit()),
            BroadcastState::WaitingForBreak => {
                let remaining = self.ads.seconds_until_next_break().unwrap_or(0.0);
                let wait = remaining.clamp(self.tuning.min_wait_secs, self.tuning.max_break_wait_secs);
                Some(ExecutableUnit::wait(UnitRole::WaitForBreak, self.state, wait))
            }
            BroadcastState::WaitingForShowEnd => {
                let remaining =
                    (self.ctx.show_duration_secs - self.clock.elapsed_secs()).max(0.0);
                let wait =
                    remaining.clamp(self.tuning.min_wait_secs, self.tuning.max_show_end_wait_secs);
                Some(ExecutableUnit::wait(UnitRole::WaitForShowEnd, self.state, wait))
            }
            BroadcastState::BreakReturnMusic => Some(ExecutableUnit::music(
                UnitRole::BreakBumper,
                self.state,
                "return bumper",
                self.tuning.bumper_secs,
            )),
            BroadcastState::BreakReturn => {
                Some(self.host_line(UnitRole::ReturnLine, LineCategory::ReturnFromBreak))
            }
            BroadcastState::DroppedCaller => {
                Some(self.host_line(UnitRole::DroppedCallerLine, LineCategory::DroppedCaller))
            }
            BroadcastState::CallerCursed => {
                Some(self.host_line(UnitRole::CursedLine, LineCategory::CallerCursed))
            }
            BroadcastState::CursingDelay => Some(ExecutableUnit::wait(
                UnitRole::CursingDelay,
                self.state,
                self.tuning.cursing_delay_secs,
            )),
            BroadcastState::Idle | BroadcastState::ShowClosing | BroadcastState::ShowEnding => None,
        }
    }

    /// On first entry, shuffle the slot order and commit the break; then
    /// emit spots in plan order, skipping unsold slots. Once the plan is
    /// exhausted a short padding wait covers the gap until `advance`
    /// closes the break.
    fn next_ad_unit(&mut self) -> ExecutableUnit {
        if !self.ctx.ad_break_begun() {
            let mut order: Vec<usize> = (0..self.ads.slots_per_break()).collect();
            fastrand::shuffle(&mut order);
            let estimated_secs: f64 = order
                .iter()
                .filter_map(|s| self.ads.spot(*s))
                .map(|spot| spot.duration_secs)
                .sum();
            eprintln!("[Show] Ad break committed, order {:?} (~{:.0}s)", order, estimated_secs);
            self.ctx.begin_ad_break(order);
            self.ads.break_started();
            self.notices.push(MachineNotice::AdBreakEntered { estimated_secs });
        }
        while let Some(slot) = self.ctx.current_ad_slot() {
            match self.ads.spot(slot) {
                Some(spot) => return ExecutableUnit::ad(self.state, slot, spot),
                None => self.ctx.advance_ad(), // unsold slot
            }
        }
        ExecutableUnit::wait(UnitRole::BreakPadding, self.state, self.tuning.min_wait_secs)
    }

    // ── Transition ──────────────────────────────────────────────────────

    /// Apply the transition for a unit the loop finished executing.
    pub fn advance(&mut self, unit: &ExecutableUnit) {
        let next = match unit.role {
            UnitRole::ShowStart => BroadcastState::IntroMusic,
            UnitRole::IntroTheme => BroadcastState::Conversation,
            UnitRole::OpeningLine => {
                self.ctx.has_played_opening = true;
                if self.callers.on_air().is_some() || self.callers.on_hold_count() > 0 {
                    BroadcastState::Conversation
                } else {
                    BroadcastState::DeadAir
                }
            }
            UnitRole::CallerArc => {
                let outcome = self.callers.end_on_air();
                if self.ctx.pending_break_transition() || self.ctx.pending_show_ending() {
                    // Flag stays set; next() emits the transition or
                    // closing line from Conversation.
                    BroadcastState::Conversation
                } else if self.ctx.take_pending_caller_drop() {
                    BroadcastState::DroppedCaller
                } else if self.ctx.take_pending_caller_curse() {
                    BroadcastState::CursingDelay
                } else if outcome.map(|o| o.off_topic).unwrap_or(false) {
                    self.ctx.queue_off_topic_remark();
                    BroadcastState::Conversation
                } else {
                    self.route_after_segment()
                }
            }
            UnitRole::BreakTransitionLine => {
                self.ctx.take_pending_break_transition();
                BroadcastState::WaitingForBreak
            }
            UnitRole::ClosingLine => {
                self.ctx.take_pending_show_ending();
                self.ctx.show_closing_started = true;
                if self.clock.elapsed_secs() >= self.ctx.show_duration_secs {
                    BroadcastState::ShowClosing
                } else {
                    BroadcastState::WaitingForShowEnd
                }
            }
            UnitRole::OffTopicRemark => {
                self.ctx.take_off_topic_remark();
                self.route_after_segment()
            }
            UnitRole::PutCallerOnAir => {
                self.callers.put_next_on_air();
                BroadcastState::Conversation
            }
            UnitRole::AdSlot => {
                self.ctx.advance_ad();
                if self.ctx.ads_exhausted() {
                    self.finish_break();
                    BroadcastState::BreakReturnMusic
                } else {
                    BroadcastState::AdBreak
                }
            }
            UnitRole::BreakPadding => {
                self.finish_break();
                BroadcastState::BreakReturnMusic
            }
            UnitRole::BreakBumper => BroadcastState::BreakReturn,
            UnitRole::ReturnLine => {
                if self.ctx.pending_show_ending() {
                    // Deferred show end: head back to Conversation so the
                    // closing line goes out next.
                    BroadcastState::Conversation
                } else {
                    self.route_after_segment()
                }
            }
            UnitRole::DroppedCallerLine | UnitRole::CursedLine => self.route_after_segment(),
            UnitRole::CursingDelay => BroadcastState::CallerCursed,
            UnitRole::FillerLine | UnitRole::BetweenCallersLine => {
                if self.callers.on_air().is_some() || self.callers.on_hold_count() > 0 {
                    BroadcastState::Conversation
                } else {
                    BroadcastState::DeadAir
                }
            }
            UnitRole::WaitForBreak => BroadcastState::AdBreak,
            UnitRole::WaitForShowEnd => {
                if self.clock.elapsed_secs() >= self.ctx.show_duration_secs {
                    BroadcastState::ShowEnding
                } else {
                    BroadcastState::WaitingForShowEnd
                }
            }
        };
        self.set_state(next);
    }

    /// Where to go after any completed on-air segment.
    fn route_after_segment(&self) -> BroadcastState {
        if self.callers.on_air().is_some() {
            BroadcastState::Conversation
        } else if self.callers.on_hold_count() > 0 {
            BroadcastState::BetweenCallers
        } else {
            BroadcastState::DeadAir
        }
    }

    fn finish_break(&mut self) {
        self.ads.break_ended();
        self.ctx.reset_ad_break();
        self.notices.push(MachineNotice::AdBreakExited);
    }

    fn set_state(&mut self, next: BroadcastState) {
        if next != self.state {
            eprintln!("[Show] {} -> {}", self.state, next);
            self.state = next;
        }
        // Dead-air edge notices fire exactly once per transition in/out.
        let now_dead = self.state == BroadcastState::DeadAir;
        if now_dead && !self.ctx.in_dead_air {
            self.ctx.in_dead_air = true;
            self.notices.push(MachineNotice::DeadAirStarted);
        } else if !now_dead && self.ctx.in_dead_air {
            self.ctx.in_dead_air = false;
            self.notices.push(MachineNotice::DeadAirEnded);
        }
    }

    fn host_line(&self, role: UnitRole, category: LineCategory) -> ExecutableUnit {
        let topic = self.callers.on_air().map(|c| c.topic);
        let line = match self.dialogue.line(category, topic.as_deref()) {
            Some(line) => line,
            None => {
                eprintln!("[Show] No line for {:?}, using fallback", category);
                fallback_line(category)
            }
        };
        ExecutableUnit::line(role, UnitKind::HostLine, self.state, line)
    }
}
