//! The broadcast loop — the driver thread that keeps the show on air.
//!
//! One long-lived thread alternates `next()` / execute / `advance()`
//! against the state machine. Interruptions arrive from other threads
//! (timer runtime, CLI, UI) as an `InterruptReason` plus a cancel of the
//! in-flight unit; the driver translates the reason into pending flags
//! and lets the machine route. A unit that ignores its cancel token is
//! abandoned after a configurable ceiling so one bad runner can never
//! freeze the station.

use crate::cancel::CancelToken;
use crate::clock::ShowClock;
use crate::config::ShowConfig;
use crate::context::BroadcastState;
use crate::sources::{AdSource, CallerSource, DialogueSource, ShowObserver};
use crate::state_machine::{MachineNotice, StateMachine};
use crate::timer::TimingEventKind;
use crate::timer_queue::{TimerHandle, spawn_timer_runtime};
use crate::unit::{ExecutableUnit, RunOutcome, UnitRunner};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Why the current unit is being interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// A break is coming up; wrap up after the current segment.
    BreakImminent,
    /// The break starts now; cut the current segment.
    BreakStarting,
    /// The show clock ran out.
    ShowEnding,
    /// The on-air caller's line went dead.
    CallerDropped,
    /// The on-air caller swore; dump and apologize.
    CallerCursed,
    /// Operator skipped the current unit; no state flag involved.
    UserSkip,
    /// Tear the whole loop down.
    Shutdown,
}

struct LoopShared {
    running: AtomicBool,
    stop_requested: AtomicBool,
    current_token: Mutex<Option<CancelToken>>,
    interrupt_reason: Mutex<Option<InterruptReason>>,
    in_ad_break: AtomicBool,
    state: Mutex<BroadcastState>,
}

impl LoopShared {
    fn new() -> Self {
        LoopShared {
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            current_token: Mutex::new(None),
            interrupt_reason: Mutex::new(None),
            in_ad_break: AtomicBool::new(false),
            state: Mutex::new(BroadcastState::Idle),
        }
    }

    /// Record a reason and optionally cancel the in-flight unit.
    /// Shutdown always wins; an already-recorded ShowEnding is never
    /// downgraded by a lesser reason.
    fn post(&self, reason: InterruptReason, cancel_current: bool) {
        {
            let mut slot = self.interrupt_reason.lock().unwrap();
            let keep = match (*slot, reason) {
                (Some(InterruptReason::Shutdown), _) => true,
                (Some(InterruptReason::ShowEnding), r) => r != InterruptReason::Shutdown,
                _ => false,
            };
            if !keep {
                *slot = Some(reason);
            }
        }
        if cancel_current {
            if let Some(token) = self.current_token.lock().unwrap().as_ref() {
                token.cancel();
            }
        }
    }

    /// Like `post`, but for break signals, which are meaningless once
    /// the break is already underway: re-arming the pending flag there
    /// would defer through the break and replay it after the return.
    fn post_break(&self, reason: InterruptReason, cancel_current: bool) {
        if self.state.lock().unwrap().in_committed_break() {
            return;
        }
        self.post(reason, cancel_current);
    }

    fn take_reason(&self) -> Option<InterruptReason> {
        self.interrupt_reason.lock().unwrap().take()
    }
}

pub struct BroadcastLoop {
    shared: Arc<LoopShared>,
    timer: TimerHandle,
    callers: Arc<dyn CallerSource>,
    ads: Arc<dyn AdSource>,
    dialogue: Arc<dyn DialogueSource>,
    runner: Arc<dyn UnitRunner>,
    observer: Arc<dyn ShowObserver>,
    clock: Arc<dyn ShowClock>,
    config: ShowConfig,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastLoop {
    pub fn new(
        config: ShowConfig,
        clock: Arc<dyn ShowClock>,
        callers: Arc<dyn CallerSource>,
        ads: Arc<dyn AdSource>,
        dialogue: Arc<dyn DialogueSource>,
        runner: Arc<dyn UnitRunner>,
        observer: Arc<dyn ShowObserver>,
    ) -> Self {
        let config = config.sanitized();
        let shared = Arc::new(LoopShared::new());
        let timer = {
            let shared = shared.clone();
            let observer = observer.clone();
            spawn_timer_runtime(clock.clone(), move |event| {
                match event.kind {
                    TimingEventKind::Break20s => {
                        shared.post_break(InterruptReason::BreakImminent, false);
                    }
                    TimingEventKind::Break0s => {
                        shared.post_break(InterruptReason::BreakStarting, true);
                    }
                    TimingEventKind::ShowEnd => {
                        shared.post(InterruptReason::ShowEnding, true);
                    }
                    _ => {}
                }
                observer.timing_event(&event);
            })
        };
        BroadcastLoop {
            shared,
            timer,
            callers,
            ads,
            dialogue,
            runner,
            observer,
            clock,
            config,
            driver: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_in_ad_break(&self) -> bool {
        self.shared.in_ad_break.load(Ordering::SeqCst)
    }

    pub fn current_state(&self) -> BroadcastState {
        *self.shared.state.lock().unwrap()
    }

    pub fn timer(&self) -> &TimerHandle {
        &self.timer
    }

    /// Go on air. Starting while already running is a logged no-op.
    pub fn start(&self, duration_secs: f64) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            eprintln!("[Loop] start ignored: broadcast already running");
            return;
        }
        if let Some(old) = self.driver.lock().unwrap().take() {
            // Previous run already wound down on its own.
            let _ = old.join();
        }
        self.shared.stop_requested.store(false, Ordering::SeqCst);
        *self.shared.interrupt_reason.lock().unwrap() = None;
        self.shared.in_ad_break.store(false, Ordering::SeqCst);
        self.timer.start_show(duration_secs);

        let shared = self.shared.clone();
        let timer = self.timer.clone();
        let mut machine = StateMachine::new(
            self.callers.clone(),
            self.ads.clone(),
            self.dialogue.clone(),
            self.clock.clone(),
            self.config.tuning.clone(),
        );
        let runner = self.runner.clone();
        let observer = self.observer.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("broadcast-driver".to_string())
            .spawn(move || {
                machine.begin_show(duration_secs);
                drive(&mut machine, &shared, &timer, &runner, &observer, &config);
                timer.stop_show();
                *shared.state.lock().unwrap() = BroadcastState::Idle;
                shared.in_ad_break.store(false, Ordering::SeqCst);
                shared.running.store(false, Ordering::SeqCst);
                eprintln!("[Loop] Broadcast ended");
            });
        match handle {
            Ok(h) => *self.driver.lock().unwrap() = Some(h),
            Err(e) => {
                eprintln!("[Loop] Failed to spawn driver: {}", e);
                self.shared.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Take the show off air and wait for the driver to finish.
    /// Safe to call repeatedly, and from any thread but the driver's own.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        self.shared.post(InterruptReason::Shutdown, true);
        let handle = self.driver.lock().unwrap().take();
        if let Some(h) = handle {
            if h.thread().id() != thread::current().id() {
                let _ = h.join();
            }
        }
    }

    /// Interrupt the in-flight unit. `BreakImminent` only flags; every
    /// other reason also cancels. Break signals arriving while a break
    /// is already underway are dropped.
    pub fn interrupt(&self, reason: InterruptReason) {
        if !self.is_running() {
            eprintln!("[Loop] interrupt {:?} ignored: not running", reason);
            return;
        }
        match reason {
            InterruptReason::BreakImminent => self.shared.post_break(reason, false),
            InterruptReason::BreakStarting => self.shared.post_break(reason, true),
            _ => self.shared.post(reason, true),
        }
    }

    /// Cut to an ad break now: the current unit is cancelled, the
    /// transition line plays, then the spots. Ignored while a break is
    /// already underway.
    pub fn start_ad_break(&self) {
        if !self.is_running() {
            eprintln!("[Loop] start_ad_break ignored: not running");
            return;
        }
        self.shared.post_break(InterruptReason::BreakStarting, true);
    }

    /// Arm the T-20/T-10/T-5/T-0 warnings for a break starting in `secs`.
    pub fn schedule_break(&self, secs_from_now: f64) {
        self.timer.schedule_break_warnings(secs_from_now);
    }
}

impl Drop for BroadcastLoop {
    fn drop(&mut self) {
        self.stop();
        self.timer.shutdown();
    }
}

fn drive(
    machine: &mut StateMachine,
    shared: &Arc<LoopShared>,
    timer: &TimerHandle,
    runner: &Arc<dyn UnitRunner>,
    observer: &Arc<dyn ShowObserver>,
    config: &ShowConfig,
) {
    let mut reported = machine.state();
    *shared.state.lock().unwrap() = reported;
    loop {
        if shared.stop_requested.load(Ordering::SeqCst) {
            break;
        }
        let unit = match machine.next() {
            Some(unit) => unit,
            None => {
                if machine.state().is_terminal() {
                    break;
                }
                thread::sleep(Duration::from_millis(config.tuning.retry_idle_millis));
                continue;
            }
        };
        publish_notices(machine, shared, timer, observer);

        let token = CancelToken::new();
        *shared.current_token.lock().unwrap() = Some(token.clone());
        let outcome = execute_unit(runner, &unit, &token, config);
        shared.current_token.lock().unwrap().take();

        match shared.take_reason() {
            Some(InterruptReason::Shutdown) => break,
            Some(InterruptReason::ShowEnding) => {
                machine.note_show_ending();
                if outcome != RunOutcome::Cancelled {
                    machine.advance(&unit);
                }
            }
            Some(InterruptReason::BreakImminent) | Some(InterruptReason::BreakStarting) => {
                if machine.state().in_committed_break() {
                    // Signal raced with the break it announced; the flag
                    // was already consumed, so just keep the break moving.
                    machine.advance(&unit);
                } else {
                    machine.note_break_imminent();
                    if outcome != RunOutcome::Cancelled {
                        machine.advance(&unit);
                    }
                }
            }
            Some(InterruptReason::CallerDropped) => {
                machine.note_caller_dropped();
                machine.advance(&unit);
            }
            Some(InterruptReason::CallerCursed) => {
                machine.note_caller_cursed();
                machine.advance(&unit);
            }
            Some(InterruptReason::UserSkip) => {
                machine.advance(&unit);
            }
            None => {
                if outcome == RunOutcome::Cancelled {
                    // Cancelled with no recorded reason: treat as a
                    // teardown rather than guess at routing.
                    eprintln!("[Loop] Unit {} cancelled without a reason, stopping", unit.id);
                    break;
                }
                machine.advance(&unit);
            }
        }

        let now = machine.state();
        if now != reported {
            observer.state_changed(reported, now);
            reported = now;
            *shared.state.lock().unwrap() = now;
        }
        publish_notices(machine, shared, timer, observer);
    }
}

fn publish_notices(
    machine: &mut StateMachine,
    shared: &Arc<LoopShared>,
    timer: &TimerHandle,
    observer: &Arc<dyn ShowObserver>,
) {
    for notice in machine.take_notices() {
        match notice {
            MachineNotice::DeadAirStarted => observer.dead_air_started(),
            MachineNotice::DeadAirEnded => observer.dead_air_ended(),
            MachineNotice::AdBreakEntered { estimated_secs } => {
                shared.in_ad_break.store(true, Ordering::SeqCst);
                timer.start_ad_break(estimated_secs);
            }
            MachineNotice::AdBreakExited => {
                shared.in_ad_break.store(false, Ordering::SeqCst);
                timer.stop_ad_break();
            }
        }
    }
}

/// Execute one unit. Sync units run on a helper thread and the driver
/// waits on a channel with a deadline; a unit that blows through its
/// budget is cancelled and left behind. Units that do not require a
/// synchronous await run fully detached.
fn execute_unit(
    runner: &Arc<dyn UnitRunner>,
    unit: &ExecutableUnit,
    token: &CancelToken,
    config: &ShowConfig,
) -> RunOutcome {
    if !unit.requires_sync_await {
        let spawned = {
            let runner = runner.clone();
            let unit = unit.clone();
            let token = token.clone();
            thread::Builder::new()
                .name("unit-worker".to_string())
                .spawn(move || {
                    run_caught(&runner, &unit, &token);
                    runner.cleanup(&unit);
                })
        };
        if let Err(e) = spawned {
            eprintln!("[Loop] Failed to spawn worker for {}: {}", unit.id, e);
        }
        return RunOutcome::Completed;
    }

    let (tx, rx) = mpsc::channel();
    let budget = Duration::from_secs_f64(
        unit.duration_secs.max(0.0) * config.time_scale + config.unit_timeout_secs,
    );
    let spawned = {
        let runner = runner.clone();
        let unit = unit.clone();
        let token = token.clone();
        thread::Builder::new()
            .name("unit-run".to_string())
            .spawn(move || {
                let outcome = run_caught(&runner, &unit, &token);
                let _ = tx.send(outcome);
            })
    };
    let handle = match spawned {
        Ok(h) => h,
        Err(e) => {
            eprintln!("[Loop] Failed to spawn unit thread for {}: {}", unit.id, e);
            return RunOutcome::Failed;
        }
    };
    let outcome = match rx.recv_timeout(budget) {
        Ok(outcome) => {
            let _ = handle.join();
            outcome
        }
        Err(_) => {
            eprintln!("[Loop] Unit {} exceeded {:.1}s budget, abandoning", unit.id, budget.as_secs_f64());
            token.cancel();
            RunOutcome::Abandoned
        }
    };
    runner.cleanup(unit);
    outcome
}

fn run_caught(runner: &Arc<dyn UnitRunner>, unit: &ExecutableUnit, token: &CancelToken) -> RunOutcome {
    match catch_unwind(AssertUnwindSafe(|| runner.run(unit, token))) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            eprintln!("[Loop] Unit {} failed: {}", unit.id, e);
            RunOutcome::Failed
        }
        Err(_) => {
            eprintln!("[Loop] Unit {} panicked", unit.id);
            RunOutcome::Failed
        }
    }
}
