//! Capability interfaces consumed by the orchestration core.
//!
//! The original design located collaborators through global registries;
//! here each is a narrow, constructor-injected trait. The core only ever
//! calls these — caller screening, ad inventory, content loading, and
//! rendering all live behind them.

use crate::context::BroadcastState;
use crate::timer::TimingEvent;
use crate::transcript::TranscriptEntry;
use serde::{Deserialize, Serialize};

/// A caller known to the caller queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub id: u32,
    pub name: String,
    pub topic: String,
    /// Length of this caller's scripted conversation arc, in seconds.
    pub arc_secs: f64,
}

/// Flags reported when a caller leaves the air.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerOutcome {
    pub off_topic: bool,
    pub fraud: bool,
}

/// One advertisement spot inside a break.
#[derive(Debug, Clone, PartialEq)]
pub struct AdSpot {
    pub name: String,
    pub duration_secs: f64,
}

/// Dialogue lookup categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineCategory {
    Opening,
    Closing,
    BetweenCallers,
    DeadAirFiller,
    BreakTransition,
    ReturnFromBreak,
    OffTopicRemark,
    DroppedCaller,
    CallerCursed,
}

/// A single deliverable host line.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueLine {
    pub speaker: String,
    pub text: String,
    pub duration_secs: f64,
}

/// The caller queue, as seen from the broadcast core.
pub trait CallerSource: Send + Sync {
    /// Callers currently waiting on hold.
    fn on_hold_count(&self) -> usize;
    /// The caller currently on air, if any.
    fn on_air(&self) -> Option<Caller>;
    /// Promote the next on-hold caller to the air. Returns false when
    /// nobody is waiting.
    fn put_next_on_air(&self) -> bool;
    /// Take the on-air caller off the air, reporting their flags.
    fn end_on_air(&self) -> Option<CallerOutcome>;
}

/// The ad coordinator, as seen from the broadcast core.
pub trait AdSource: Send + Sync {
    /// Configured number of spots per break.
    fn slots_per_break(&self) -> usize;
    /// The spot occupying `slot`, if sold.
    fn spot(&self, slot: usize) -> Option<AdSpot>;
    /// Notification: the break the core committed to has begun.
    fn break_started(&self);
    /// Notification: all spots played (or the break was cut short).
    fn break_ended(&self);
    /// Show-clock seconds until the next scheduled break, if one is set.
    fn seconds_until_next_break(&self) -> Option<f64>;
}

/// Weighted dialogue lookup, optionally keyed by topic.
pub trait DialogueSource: Send + Sync {
    fn line(&self, category: LineCategory, topic: Option<&str>) -> Option<DialogueLine>;
}

/// Append-only transcript sink. Write-only from the core's perspective.
pub trait TranscriptSink: Send + Sync {
    fn append(&self, entry: TranscriptEntry);
}

/// Notifications other subsystems (UI, ad coordinator) subscribe to.
/// Every method has a no-op default so observers implement only what
/// they need. Called from the driver and timer threads; implementations
/// must not block.
pub trait ShowObserver: Send + Sync {
    fn state_changed(&self, _from: BroadcastState, _to: BroadcastState) {}
    fn dead_air_started(&self) {}
    fn dead_air_ended(&self) {}
    fn timing_event(&self, _event: &TimingEvent) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl ShowObserver for NullObserver {}
