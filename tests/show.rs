//! End-to-end broadcast scenarios against the public API, driven in
//! accelerated time with the simulated caller queue and ad inventory.

use airtime::broadcast_loop::{BroadcastLoop, InterruptReason};
use airtime::cancel::CancelToken;
use airtime::clock::{ShowClock, WallClock};
use airtime::config::ShowConfig;
use airtime::context::BroadcastState;
use airtime::dialogue::DialogueBank;
use airtime::sim::{SimAdSource, SimCallerQueue};
use airtime::sources::{CallerOutcome, LineCategory, ShowObserver};
use airtime::timer::{TimingEvent, TimingEventKind};
use airtime::transcript::{TranscriptEntry, TranscriptLog};
use airtime::unit::{ExecutableUnit, RunOutcome, SimRunner, UnitKind, UnitRunner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

struct RecordingObserver {
    states: Mutex<Vec<BroadcastState>>,
    events: Mutex<Vec<TimingEventKind>>,
}

impl RecordingObserver {
    fn new() -> Self {
        RecordingObserver {
            states: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    fn states(&self) -> Vec<BroadcastState> {
        self.states.lock().unwrap().clone()
    }

    fn events(&self) -> Vec<TimingEventKind> {
        self.events.lock().unwrap().clone()
    }
}

impl ShowObserver for RecordingObserver {
    fn state_changed(&self, _from: BroadcastState, to: BroadcastState) {
        self.states.lock().unwrap().push(to);
    }

    fn timing_event(&self, event: &TimingEvent) {
        self.events.lock().unwrap().push(event.kind);
    }
}

struct Studio {
    broadcast: BroadcastLoop,
    transcript: Arc<TranscriptLog>,
    callers: Arc<SimCallerQueue>,
    ads: Arc<SimAdSource>,
    observer: Arc<RecordingObserver>,
}

fn studio(config: ShowConfig) -> Studio {
    let config = config.sanitized();
    let clock: Arc<dyn ShowClock> = Arc::new(WallClock::new());
    let transcript = Arc::new(TranscriptLog::new());
    let runner = Arc::new(SimRunner::with_time_scale(
        transcript.clone(),
        clock.clone(),
        config.time_scale,
    ));
    studio_with_runner(config, clock, transcript, runner)
}

fn studio_with_runner(
    config: ShowConfig,
    clock: Arc<dyn ShowClock>,
    transcript: Arc<TranscriptLog>,
    runner: Arc<dyn UnitRunner>,
) -> Studio {
    let callers = Arc::new(SimCallerQueue::new());
    let ads = Arc::new(SimAdSource::new(config.ad_slots_per_break, clock.clone()));
    let observer = Arc::new(RecordingObserver::new());
    let broadcast = BroadcastLoop::new(
        config,
        clock,
        callers.clone(),
        ads.clone(),
        Arc::new(DialogueBank::default_bank()),
        runner,
        observer.clone(),
    );
    Studio {
        broadcast,
        transcript,
        callers,
        ads,
        observer,
    }
}

fn fast_config(duration: f64, time_scale: f64) -> ShowConfig {
    let mut config = ShowConfig::default();
    config.show_duration_secs = duration;
    config.time_scale = time_scale;
    config.unit_timeout_secs = 5.0;
    config.tuning.retry_idle_millis = 20;
    config
}

fn wait_until_stopped(broadcast: &BroadcastLoop, max: Duration) {
    let deadline = Instant::now() + max;
    while broadcast.is_running() {
        assert!(Instant::now() < deadline, "show did not end in time");
        thread::sleep(Duration::from_millis(20));
    }
}

fn wait_for<F: Fn() -> bool>(cond: F, max: Duration, what: &str) {
    let deadline = Instant::now() + max;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(20));
    }
}

fn bank_texts(category: LineCategory) -> Vec<String> {
    let bank = DialogueBank::default_bank();
    bank.lines[&category].iter().map(|l| l.text.clone()).collect()
}

fn closing_texts() -> Vec<String> {
    bank_texts(LineCategory::Closing)
}

fn transition_count(lines: &[TranscriptEntry]) -> usize {
    let texts = bank_texts(LineCategory::BreakTransition);
    lines.iter().filter(|e| texts.contains(&e.text)).count()
}

#[test]
fn show_with_callers_opens_converses_and_closes() {
    let s = studio(fast_config(1.2, 0.02));
    s.callers
        .push_caller("Dale", "lights over the reservoir", 8.0, CallerOutcome::default());
    s.callers
        .push_caller("Marge", "the old tunnel system", 6.0, CallerOutcome::default());
    s.broadcast.start(1.2);
    wait_until_stopped(&s.broadcast, Duration::from_secs(15));

    let lines = s.transcript.snapshot();
    assert!(
        lines.iter().any(|e| e.speaker == "Dale"),
        "first caller never made it on air"
    );
    let closings = closing_texts();
    let last_host = lines
        .iter()
        .rev()
        .find(|e| e.speaker == "Host")
        .expect("no host lines at all");
    assert!(
        closings.contains(&last_host.text),
        "show did not close with a closing line: {:?}",
        last_host.text
    );
    // Intro and conversation phases both reached.
    let states = s.observer.states();
    assert!(states.contains(&BroadcastState::IntroMusic));
    assert!(states.contains(&BroadcastState::Conversation));
    // Show-clock offsets never go backwards.
    assert!(
        lines.windows(2).all(|w| w[0].elapsed_secs <= w[1].elapsed_secs),
        "transcript offsets are not monotonic"
    );
    s.broadcast.stop();
}

#[test]
fn scheduled_break_plays_every_spot_and_returns() {
    let mut config = fast_config(3.0, 0.02);
    config.ad_slots_per_break = 3;
    let s = studio(config);
    s.callers
        .push_caller("Dale", "lights", 40.0, CallerOutcome::default());
    s.broadcast.start(3.0);
    s.ads.set_next_break_in(0.5);
    s.broadcast.schedule_break(0.5);
    wait_until_stopped(&s.broadcast, Duration::from_secs(20));

    let lines = s.transcript.snapshot();
    let ads_played: Vec<_> = lines.iter().filter(|e| e.speaker == "ad").collect();
    assert_eq!(ads_played.len(), 3, "expected all three spots on air");
    assert!(
        lines.iter().any(|e| e.phase == BroadcastState::BreakReturn),
        "no return-from-break line"
    );
    let states = s.observer.states();
    assert!(states.contains(&BroadcastState::AdBreak));
    assert!(states.contains(&BroadcastState::BreakReturnMusic));
    assert!(
        s.observer.events().contains(&TimingEventKind::Break0s),
        "T-0 warning never fired"
    );
    assert!(!s.broadcast.is_in_ad_break());
}

#[test]
fn show_end_mid_break_finishes_break_before_closing() {
    let mut config = fast_config(0.9, 0.02);
    config.ad_slots_per_break = 3;
    let s = studio(config);
    s.broadcast.start(0.9);
    // Break begins just before the show clock runs out; the three spots
    // plus the bumper outlast the show.
    s.ads.set_next_break_in(0.7);
    s.broadcast.schedule_break(0.7);
    wait_until_stopped(&s.broadcast, Duration::from_secs(20));

    let lines = s.transcript.snapshot();
    let ads_played = lines.iter().filter(|e| e.speaker == "ad").count();
    assert_eq!(ads_played, 3, "show end must not cut the committed break");
    let last_ad = lines.iter().rposition(|e| e.speaker == "ad").unwrap();
    let closings = closing_texts();
    let closing_at = lines
        .iter()
        .position(|e| closings.contains(&e.text))
        .expect("no closing line after the break");
    assert!(
        closing_at > last_ad,
        "closing line went out before the break ended"
    );
}

#[test]
fn break_signals_mid_break_do_not_replay_it() {
    let mut config = fast_config(3.0, 0.02);
    config.ad_slots_per_break = 3;
    let s = studio(config);
    s.callers
        .push_caller("Dale", "lights", 30.0, CallerOutcome::default());
    s.broadcast.start(3.0);
    s.ads.set_next_break_in(0.4);
    s.broadcast.interrupt(InterruptReason::BreakImminent);
    wait_for(
        || s.broadcast.is_in_ad_break(),
        Duration::from_secs(10),
        "the break to begin",
    );
    // Late break signals (T-0 landing after the flag was consumed, an
    // operator double-press) must not re-arm the pending flag.
    s.broadcast.interrupt(InterruptReason::BreakStarting);
    s.broadcast.interrupt(InterruptReason::BreakImminent);
    wait_until_stopped(&s.broadcast, Duration::from_secs(20));

    let lines = s.transcript.snapshot();
    let ads_played = lines.iter().filter(|e| e.speaker == "ad").count();
    assert_eq!(ads_played, 3, "duplicate break signals replayed the break");
    assert_eq!(
        transition_count(&lines),
        1,
        "a second transition line went out"
    );
}

#[test]
fn on_demand_ad_break_cuts_in_and_returns() {
    let mut config = fast_config(2.5, 0.02);
    config.ad_slots_per_break = 2;
    let s = studio(config);
    s.callers
        .push_caller("Dale", "lights", 60.0, CallerOutcome::default());
    s.broadcast.start(2.5);
    wait_for(
        || s.transcript.snapshot().iter().any(|e| e.speaker == "Dale"),
        Duration::from_secs(10),
        "caller to reach the air",
    );
    s.broadcast.start_ad_break();
    wait_for(
        || s.broadcast.is_in_ad_break(),
        Duration::from_secs(10),
        "the on-demand break",
    );
    wait_until_stopped(&s.broadcast, Duration::from_secs(20));

    let lines = s.transcript.snapshot();
    let ads_played = lines.iter().filter(|e| e.speaker == "ad").count();
    assert_eq!(ads_played, 2, "on-demand break did not play its spots");
    assert_eq!(transition_count(&lines), 1);
    assert!(
        lines.iter().any(|e| e.phase == BroadcastState::BreakReturn),
        "no return line after the on-demand break"
    );
}

struct HangOnceRunner {
    inner: SimRunner,
    hung: AtomicBool,
}

impl UnitRunner for HangOnceRunner {
    fn run(&self, unit: &ExecutableUnit, cancel: &CancelToken) -> Result<RunOutcome, String> {
        if unit.kind == UnitKind::HostLine && !self.hung.swap(true, Ordering::SeqCst) {
            // Ignores the cancel token entirely.
            thread::sleep(Duration::from_secs(10));
            return Ok(RunOutcome::Completed);
        }
        self.inner.run(unit, cancel)
    }
}

#[test]
fn hung_unit_is_abandoned_and_the_show_goes_on() {
    let mut config = fast_config(1.0, 0.02);
    config.unit_timeout_secs = 0.3;
    let config = config.sanitized();
    let clock: Arc<dyn ShowClock> = Arc::new(WallClock::new());
    let transcript = Arc::new(TranscriptLog::new());
    let runner = Arc::new(HangOnceRunner {
        inner: SimRunner::with_time_scale(transcript.clone(), clock.clone(), config.time_scale),
        hung: AtomicBool::new(false),
    });
    let s = studio_with_runner(config, clock, transcript, runner);
    s.broadcast.start(1.0);
    wait_until_stopped(&s.broadcast, Duration::from_secs(15));
    // The first host line hung; everything after it still aired.
    assert!(
        s.transcript.len() >= 1,
        "loop froze behind the hung unit"
    );
    assert_eq!(s.broadcast.current_state(), BroadcastState::Idle);
}

#[test]
fn dropped_caller_interruption_airs_the_apology() {
    let s = studio(fast_config(4.0, 0.1));
    s.callers
        .push_caller("Dale", "lights", 15.0, CallerOutcome::default());
    s.broadcast.start(4.0);
    // Wait for the caller's arc to reach the air, then kill the line.
    wait_for(
        || s.transcript.snapshot().iter().any(|e| e.speaker == "Dale"),
        Duration::from_secs(10),
        "caller to reach the air",
    );
    thread::sleep(Duration::from_millis(100));
    s.broadcast.interrupt(InterruptReason::CallerDropped);
    wait_for(
        || {
            s.transcript
                .snapshot()
                .iter()
                .any(|e| e.phase == BroadcastState::DroppedCaller)
        },
        Duration::from_secs(10),
        "dropped-caller line",
    );
    s.broadcast.stop();
    assert!(!s.broadcast.is_running());
}

#[test]
fn stop_mid_show_then_restart() {
    let s = studio(fast_config(30.0, 0.05));
    s.broadcast.start(30.0);
    thread::sleep(Duration::from_millis(300));
    s.broadcast.stop();
    assert!(!s.broadcast.is_running());
    assert_eq!(s.broadcast.current_state(), BroadcastState::Idle);

    // The loop can go back on air after a stop.
    s.broadcast.start(0.5);
    assert!(s.broadcast.is_running());
    wait_until_stopped(&s.broadcast, Duration::from_secs(15));
    assert_eq!(s.broadcast.current_state(), BroadcastState::Idle);
}
