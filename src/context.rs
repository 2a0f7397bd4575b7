//! Broadcast states and the mutable show context.
//!
//! `ShowContext` holds the sticky "pending" flags and the ad-break plan.
//! It is owned by the state machine and mutated only inside transition
//! calls, which the broadcast loop invokes from a single thread — no lock
//! is needed here. Consuming a pending flag clears it in the same
//! transition, so no flag can be acted on twice.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broadcast phases. Owned exclusively by the state machine; the loop
/// reads the current value but never mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastState {
    Idle,
    ShowStarting,
    IntroMusic,
    Conversation,
    BetweenCallers,
    DeadAir,
    AdBreak,
    WaitingForBreak,
    WaitingForShowEnd,
    BreakReturnMusic,
    BreakReturn,
    DroppedCaller,
    CallerCursed,
    CursingDelay,
    ShowClosing,
    ShowEnding,
}

impl BroadcastState {
    /// States inside an already-committed ad break. Pending transitions
    /// (break or show-ending) are deferred while in one of these.
    pub fn in_committed_break(self) -> bool {
        matches!(
            self,
            BroadcastState::AdBreak
                | BroadcastState::WaitingForBreak
                | BroadcastState::BreakReturnMusic
                | BroadcastState::BreakReturn
        )
    }

    /// Terminal states: the machine emits no further units from these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BroadcastState::Idle | BroadcastState::ShowClosing | BroadcastState::ShowEnding
        )
    }
}

impl fmt::Display for BroadcastState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BroadcastState::Idle => "idle",
            BroadcastState::ShowStarting => "show-starting",
            BroadcastState::IntroMusic => "intro-music",
            BroadcastState::Conversation => "conversation",
            BroadcastState::BetweenCallers => "between-callers",
            BroadcastState::DeadAir => "dead-air",
            BroadcastState::AdBreak => "ad-break",
            BroadcastState::WaitingForBreak => "waiting-for-break",
            BroadcastState::WaitingForShowEnd => "waiting-for-show-end",
            BroadcastState::BreakReturnMusic => "break-return-music",
            BroadcastState::BreakReturn => "break-return",
            BroadcastState::DroppedCaller => "dropped-caller",
            BroadcastState::CallerCursed => "caller-cursed",
            BroadcastState::CursingDelay => "cursing-delay",
            BroadcastState::ShowClosing => "show-closing",
            BroadcastState::ShowEnding => "show-ending",
        };
        write!(f, "{}", name)
    }
}

/// The mutable facts the state machine reads when deciding transitions.
#[derive(Debug, Default)]
pub struct ShowContext {
    /// Scheduled length of the show, in seconds.
    pub show_duration_secs: f64,
    pending_break_transition: bool,
    pending_show_ending: bool,
    pending_caller_drop: bool,
    pending_caller_curse: bool,
    pending_off_topic_remark: bool,
    pub has_played_opening: bool,
    pub show_closing_started: bool,
    // Ad-break plan: shuffled slot order and the cursor into it.
    ad_play_order: Vec<usize>,
    ad_index: usize,
    ad_break_begun: bool,
    pub in_dead_air: bool,
}

impl ShowContext {
    pub fn new(show_duration_secs: f64) -> Self {
        ShowContext {
            show_duration_secs,
            ..ShowContext::default()
        }
    }

    // ── Pending flags ───────────────────────────────────────────────────

    pub fn set_pending_break_transition(&mut self) {
        self.pending_break_transition = true;
    }

    pub fn pending_break_transition(&self) -> bool {
        self.pending_break_transition
    }

    /// Consume the break-transition flag. Returns whether it was set.
    pub fn take_pending_break_transition(&mut self) -> bool {
        std::mem::take(&mut self.pending_break_transition)
    }

    pub fn set_pending_show_ending(&mut self) {
        self.pending_show_ending = true;
    }

    pub fn pending_show_ending(&self) -> bool {
        self.pending_show_ending
    }

    pub fn take_pending_show_ending(&mut self) -> bool {
        std::mem::take(&mut self.pending_show_ending)
    }

    pub fn set_pending_caller_drop(&mut self) {
        self.pending_caller_drop = true;
    }

    pub fn pending_caller_drop(&self) -> bool {
        self.pending_caller_drop
    }

    pub fn take_pending_caller_drop(&mut self) -> bool {
        std::mem::take(&mut self.pending_caller_drop)
    }

    pub fn set_pending_caller_curse(&mut self) {
        self.pending_caller_curse = true;
    }

    pub fn pending_caller_curse(&self) -> bool {
        self.pending_caller_curse
    }

    pub fn take_pending_caller_curse(&mut self) -> bool {
        std::mem::take(&mut self.pending_caller_curse)
    }

    pub fn queue_off_topic_remark(&mut self) {
        self.pending_off_topic_remark = true;
    }

    pub fn off_topic_remark_queued(&self) -> bool {
        self.pending_off_topic_remark
    }

    pub fn take_off_topic_remark(&mut self) -> bool {
        std::mem::take(&mut self.pending_off_topic_remark)
    }

    // ── Ad-break plan ───────────────────────────────────────────────────

    /// Install a freshly shuffled play order and mark the break begun.
    pub fn begin_ad_break(&mut self, play_order: Vec<usize>) {
        self.ad_play_order = play_order;
        self.ad_index = 0;
        self.ad_break_begun = true;
    }

    pub fn ad_break_begun(&self) -> bool {
        self.ad_break_begun
    }

    /// The slot to play next, or None once the plan is exhausted.
    pub fn current_ad_slot(&self) -> Option<usize> {
        self.ad_play_order.get(self.ad_index).copied()
    }

    pub fn advance_ad(&mut self) {
        self.ad_index += 1;
    }

    pub fn ads_exhausted(&self) -> bool {
        self.ad_index >= self.ad_play_order.len()
    }

    pub fn ad_play_order(&self) -> &[usize] {
        &self.ad_play_order
    }

    /// Clear the plan so the next break re-shuffles.
    pub fn reset_ad_break(&mut self) {
        self.ad_play_order.clear();
        self.ad_index = 0;
        self.ad_break_begun = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_break_states() {
        assert!(BroadcastState::AdBreak.in_committed_break());
        assert!(BroadcastState::WaitingForBreak.in_committed_break());
        assert!(BroadcastState::BreakReturnMusic.in_committed_break());
        assert!(BroadcastState::BreakReturn.in_committed_break());
        assert!(!BroadcastState::Conversation.in_committed_break());
        assert!(!BroadcastState::DeadAir.in_committed_break());
    }

    #[test]
    fn terminal_states() {
        assert!(BroadcastState::Idle.is_terminal());
        assert!(BroadcastState::ShowClosing.is_terminal());
        assert!(BroadcastState::ShowEnding.is_terminal());
        assert!(!BroadcastState::Conversation.is_terminal());
    }

    #[test]
    fn pending_flag_consumed_exactly_once() {
        let mut ctx = ShowContext::new(600.0);
        assert!(!ctx.pending_break_transition());
        ctx.set_pending_break_transition();
        assert!(ctx.pending_break_transition());
        assert!(ctx.take_pending_break_transition());
        assert!(!ctx.pending_break_transition());
        assert!(!ctx.take_pending_break_transition());
    }

    #[test]
    fn flags_are_independent() {
        let mut ctx = ShowContext::new(600.0);
        ctx.set_pending_show_ending();
        ctx.set_pending_caller_drop();
        assert!(ctx.take_pending_show_ending());
        assert!(ctx.pending_caller_drop());
        assert!(!ctx.pending_caller_curse());
    }

    #[test]
    fn ad_plan_walks_in_order() {
        let mut ctx = ShowContext::new(600.0);
        ctx.begin_ad_break(vec![2, 0, 1]);
        assert_eq!(ctx.current_ad_slot(), Some(2));
        ctx.advance_ad();
        assert_eq!(ctx.current_ad_slot(), Some(0));
        ctx.advance_ad();
        assert_eq!(ctx.current_ad_slot(), Some(1));
        assert!(!ctx.ads_exhausted());
        ctx.advance_ad();
        assert!(ctx.ads_exhausted());
        assert_eq!(ctx.current_ad_slot(), None);
    }

    #[test]
    fn reset_ad_break_clears_plan() {
        let mut ctx = ShowContext::new(600.0);
        ctx.begin_ad_break(vec![0, 1]);
        ctx.advance_ad();
        ctx.reset_ad_break();
        assert!(!ctx.ad_break_begun());
        assert!(ctx.ads_exhausted());
        assert!(ctx.ad_play_order().is_empty());
    }

    #[test]
    fn state_display_names() {
        assert_eq!(format!("{}", BroadcastState::AdBreak), "ad-break");
        assert_eq!(format!("{}", BroadcastState::WaitingForShowEnd), "waiting-for-show-end");
    }

    #[test]
    fn state_serializes_kebab_case() {
        let json = serde_json::to_string(&BroadcastState::BreakReturnMusic).unwrap();
        assert_eq!(json, "\"break-return-music\"");
    }
}
