//! Thread-safe timer façade — queued operations drained by the owning
//! thread.
//!
//! The `TimerService` primitives may only be touched by the thread that
//! owns them. Any other thread describes the mutation it wants as a
//! `TimerOperation` and enqueues it; the timer runtime thread drains the
//! queue in FIFO order, applies each operation, then ticks the service
//! and publishes resulting events through a callback (the same pattern
//! as the audio runtime: a dedicated thread owns the resource, a
//! cloneable handle is what everyone else holds).

use crate::clock::ShowClock;
use crate::timer::{TimerService, TimingEvent, TimingEventKind};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Hard cap on queued operations. On overflow the oldest entry is
/// dropped with a warning so a runaway producer cannot exhaust memory.
pub const MAX_TIMER_QUEUE: usize = 1000;

/// How often the owning thread drains and ticks.
const DRAIN_TICK: Duration = Duration::from_millis(25);

/// A queued, thread-safe description of a timer mutation or query.
/// Created on any thread; consumed only on the owning thread.
pub enum TimerOperation {
    StartShow { duration_secs: f64 },
    StopShow,
    ScheduleBreakWarnings { secs_from_now: f64 },
    StartAdBreak { duration_secs: f64 },
    StopAdBreak,
    /// Read the remaining time for a countdown kind; the reply callback
    /// fires on the owning thread after the value is read.
    QueryTimeUntil {
        kind: TimingEventKind,
        reply: Box<dyn FnOnce(Option<f64>) + Send>,
    },
    /// Read whether a show is active.
    QueryActive { reply: Box<dyn FnOnce(bool) + Send> },
}

/// An operation plus its creation timestamp (queue-latency diagnostics).
pub struct QueuedOperation {
    pub op: TimerOperation,
    pub created_at: Instant,
}

/// Mutex-guarded FIFO of pending timer operations.
pub struct TimerQueue {
    entries: Mutex<VecDeque<QueuedOperation>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        TimerQueue {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an operation, dropping the oldest entry first if the
    /// queue is at capacity.
    pub fn enqueue(&self, op: TimerOperation) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= MAX_TIMER_QUEUE {
            entries.pop_front();
            eprintln!("[TimerQueue] queue full, dropping oldest operation");
        }
        entries.push_back(QueuedOperation {
            op,
            created_at: Instant::now(),
        });
    }

    /// Swap out everything under the lock; callers apply outside it.
    pub fn drain(&self) -> Vec<QueuedOperation> {
        let mut entries = self.entries.lock().unwrap();
        entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one operation to the service on the owning thread. Returns any
/// events that must be published immediately.
fn apply(service: &mut TimerService, queued: QueuedOperation) -> Vec<TimingEvent> {
    match queued.op {
        TimerOperation::StartShow { duration_secs } => {
            service.start_show(duration_secs);
            Vec::new()
        }
        TimerOperation::StopShow => {
            service.stop_show();
            Vec::new()
        }
        TimerOperation::ScheduleBreakWarnings { secs_from_now } => {
            service.schedule_break_warnings(secs_from_now);
            Vec::new()
        }
        TimerOperation::StartAdBreak { duration_secs } => service.start_ad_break(duration_secs),
        TimerOperation::StopAdBreak => service.stop_ad_break(),
        TimerOperation::QueryTimeUntil { kind, reply } => {
            let value = service.time_until(kind);
            // One bad callback must not stop the drain.
            if catch_unwind(AssertUnwindSafe(move || reply(value))).is_err() {
                eprintln!("[TimerQueue] time-until reply callback panicked");
            }
            Vec::new()
        }
        TimerOperation::QueryActive { reply } => {
            let value = service.is_active();
            if catch_unwind(AssertUnwindSafe(move || reply(value))).is_err() {
                eprintln!("[TimerQueue] active reply callback panicked");
            }
            Vec::new()
        }
    }
}

/// Cloneable, Send+Sync handle for enqueueing timer operations from any
/// thread.
#[derive(Clone)]
pub struct TimerHandle {
    queue: Arc<TimerQueue>,
    running: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn start_show(&self, duration_secs: f64) {
        self.queue.enqueue(TimerOperation::StartShow { duration_secs });
    }

    pub fn stop_show(&self) {
        self.queue.enqueue(TimerOperation::StopShow);
    }

    pub fn schedule_break_warnings(&self, secs_from_now: f64) {
        self.queue
            .enqueue(TimerOperation::ScheduleBreakWarnings { secs_from_now });
    }

    pub fn start_ad_break(&self, duration_secs: f64) {
        self.queue
            .enqueue(TimerOperation::StartAdBreak { duration_secs });
    }

    pub fn stop_ad_break(&self) {
        self.queue.enqueue(TimerOperation::StopAdBreak);
    }

    pub fn query_time_until<F>(&self, kind: TimingEventKind, reply: F)
    where
        F: FnOnce(Option<f64>) + Send + 'static,
    {
        self.queue.enqueue(TimerOperation::QueryTimeUntil {
            kind,
            reply: Box::new(reply),
        });
    }

    pub fn query_active<F>(&self, reply: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.queue.enqueue(TimerOperation::QueryActive {
            reply: Box::new(reply),
        });
    }

    /// Ask the runtime thread to exit. Queued operations already
    /// accepted are still drained before it does.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Spawn the timer runtime on its own thread. The thread owns the
/// `TimerService`; `on_event` is invoked from that thread for every
/// published timing event.
pub fn spawn_timer_runtime<F>(clock: Arc<dyn ShowClock>, on_event: F) -> TimerHandle
where
    F: Fn(TimingEvent) + Send + 'static,
{
    let queue = Arc::new(TimerQueue::new());
    let running = Arc::new(AtomicBool::new(true));

    let thread_queue = queue.clone();
    let thread_running = running.clone();
    thread::Builder::new()
        .name("timer-runtime".into())
        .spawn(move || {
            let mut service = TimerService::new(clock);
            loop {
                // Drain until empty so an operation enqueued while we
                // were applying the previous batch is never stranded.
                loop {
                    let batch = thread_queue.drain();
                    if batch.is_empty() {
                        break;
                    }
                    for queued in batch {
                        for event in apply(&mut service, queued) {
                            on_event(event);
                        }
                    }
                }
                for event in service.tick() {
                    on_event(event);
                }
                if !thread_running.load(Ordering::SeqCst) && thread_queue.is_empty() {
                    break;
                }
                thread::sleep(DRAIN_TICK);
            }
        })
        .expect("failed to spawn timer-runtime thread");

    TimerHandle { queue, running }
}
