//! Simulated caller queue and ad inventory.
//!
//! These stand in for the phone screener and the traffic department.
//! Both are driven from outside the core (CLI, tests) and consumed by
//! the state machine through the `CallerSource` / `AdSource` traits.

use crate::clock::ShowClock;
use crate::sources::{AdSource, AdSpot, Caller, CallerOutcome, CallerSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

struct QueuedCaller {
    caller: Caller,
    outcome: CallerOutcome,
}

#[derive(Default)]
struct CallerQueueState {
    on_hold: VecDeque<QueuedCaller>,
    on_air: Option<QueuedCaller>,
}

/// Scripted caller queue. Callers are pushed with a pre-planned outcome
/// that is reported back when they leave the air.
pub struct SimCallerQueue {
    inner: Mutex<CallerQueueState>,
    next_id: AtomicU32,
}

impl SimCallerQueue {
    pub fn new() -> Self {
        SimCallerQueue {
            inner: Mutex::new(CallerQueueState::default()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Add a caller to the hold queue. Returns the assigned id.
    pub fn push_caller(&self, name: &str, topic: &str, arc_secs: f64, outcome: CallerOutcome) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.inner.lock().unwrap();
        state.on_hold.push_back(QueuedCaller {
            caller: Caller {
                id,
                name: name.to_string(),
                topic: topic.to_string(),
                arc_secs: arc_secs.max(0.5),
            },
            outcome,
        });
        id
    }
}

impl Default for SimCallerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CallerSource for SimCallerQueue {
    fn on_hold_count(&self) -> usize {
        self.inner.lock().unwrap().on_hold.len()
    }

    fn on_air(&self) -> Option<Caller> {
        self.inner
            .lock()
            .unwrap()
            .on_air
            .as_ref()
            .map(|q| q.caller.clone())
    }

    fn put_next_on_air(&self) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.on_air.is_some() {
            eprintln!("[Callers] put_next_on_air ignored: a caller is already on air");
            return false;
        }
        match state.on_hold.pop_front() {
            Some(next) => {
                eprintln!("[Callers] {} is on the air ({})", next.caller.name, next.caller.topic);
                state.on_air = Some(next);
                true
            }
            None => false,
        }
    }

    fn end_on_air(&self) -> Option<CallerOutcome> {
        let mut state = self.inner.lock().unwrap();
        state.on_air.take().map(|q| q.outcome)
    }
}

#[derive(Default)]
struct AdState {
    in_break: bool,
    /// Absolute show-clock offset of the next scheduled break.
    next_break_at: Option<f64>,
}

/// Simulated ad inventory: a fixed number of slots per break, every slot
/// sold, with deterministic names and durations.
pub struct SimAdSource {
    slots: usize,
    clock: Arc<dyn ShowClock>,
    inner: Mutex<AdState>,
}

impl SimAdSource {
    pub fn new(slots: usize, clock: Arc<dyn ShowClock>) -> Self {
        SimAdSource {
            slots: slots.max(1),
            clock,
            inner: Mutex::new(AdState::default()),
        }
    }

    /// Schedule the next break `secs` show-clock seconds from now.
    pub fn set_next_break_in(&self, secs: f64) {
        let at = self.clock.elapsed_secs() + secs.max(0.0);
        self.inner.lock().unwrap().next_break_at = Some(at);
    }

    pub fn in_break(&self) -> bool {
        self.inner.lock().unwrap().in_break
    }
}

impl AdSource for SimAdSource {
    fn slots_per_break(&self) -> usize {
        self.slots
    }

    fn spot(&self, slot: usize) -> Option<AdSpot> {
        if slot >= self.slots {
            return None;
        }
        Some(AdSpot {
            name: format!("Ad #{}", slot + 1),
            duration_secs: 6.0 + (slot % 3) as f64 * 2.0,
        })
    }

    fn break_started(&self) {
        let mut state = self.inner.lock().unwrap();
        state.in_break = true;
        state.next_break_at = None;
    }

    fn break_ended(&self) {
        self.inner.lock().unwrap().in_break = false;
    }

    fn seconds_until_next_break(&self) -> Option<f64> {
        let state = self.inner.lock().unwrap();
        state
            .next_break_at
            .map(|at| (at - self.clock.elapsed_secs()).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn callers_come_off_hold_in_order() {
        let queue = SimCallerQueue::new();
        queue.push_caller("Dale", "lights in the sky", 20.0, CallerOutcome::default());
        queue.push_caller("Marge", "tunnels", 15.0, CallerOutcome::default());
        assert_eq!(queue.on_hold_count(), 2);
        assert!(queue.put_next_on_air());
        assert_eq!(queue.on_air().unwrap().name, "Dale");
        assert_eq!(queue.on_hold_count(), 1);
    }

    #[test]
    fn put_next_fails_when_someone_is_on_air() {
        let queue = SimCallerQueue::new();
        queue.push_caller("Dale", "lights", 20.0, CallerOutcome::default());
        queue.push_caller("Marge", "tunnels", 15.0, CallerOutcome::default());
        assert!(queue.put_next_on_air());
        assert!(!queue.put_next_on_air());
    }

    #[test]
    fn end_on_air_reports_planned_outcome() {
        let queue = SimCallerQueue::new();
        queue.push_caller(
            "Ray",
            "the interstate",
            10.0,
            CallerOutcome {
                off_topic: true,
                fraud: false,
            },
        );
        queue.put_next_on_air();
        let outcome = queue.end_on_air().unwrap();
        assert!(outcome.off_topic);
        assert!(queue.on_air().is_none());
    }

    #[test]
    fn end_on_air_with_nobody_is_none() {
        let queue = SimCallerQueue::new();
        assert!(queue.end_on_air().is_none());
    }

    #[test]
    fn every_slot_is_sold() {
        let clock = Arc::new(ManualClock::new());
        let ads = SimAdSource::new(3, clock);
        for slot in 0..3 {
            assert!(ads.spot(slot).is_some());
        }
        assert!(ads.spot(3).is_none());
    }

    #[test]
    fn next_break_countdown_tracks_show_clock() {
        let clock = ManualClock::new();
        let ads = SimAdSource::new(2, Arc::new(clock.clone()));
        assert!(ads.seconds_until_next_break().is_none());
        ads.set_next_break_in(30.0);
        clock.advance_secs(10.0);
        let remaining = ads.seconds_until_next_break().unwrap();
        assert!((remaining - 20.0).abs() < 1e-6);
        clock.advance_secs(40.0);
        assert_eq!(ads.seconds_until_next_break(), Some(0.0));
    }

    #[test]
    fn break_lifecycle_clears_schedule() {
        let clock = Arc::new(ManualClock::new());
        let ads = SimAdSource::new(2, clock);
        ads.set_next_break_in(5.0);
        ads.break_started();
        assert!(ads.in_break());
        assert!(ads.seconds_until_next_break().is_none());
        ads.break_ended();
        assert!(!ads.in_break());
    }
}
