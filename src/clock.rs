//! Show clocks — monotonic elapsed-show-time sources.
//!
//! All relative timer math in the core is measured against a `ShowClock`,
//! never the wall clock, so pausing or time-scaling the simulation stays
//! consistent across the timer service and the wait units.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic elapsed show time. Implementations must never go backwards.
pub trait ShowClock: Send + Sync {
    /// Time elapsed since the clock was started.
    fn elapsed(&self) -> Duration;

    /// Elapsed time as fractional seconds.
    fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

/// Real-time clock anchored at creation.
pub struct WallClock {
    started: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        WallClock {
            started: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ShowClock for WallClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Manually advanced clock for tests and stepped simulation.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    /// Move the clock forward by fractional seconds.
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }

    /// Set the clock to an absolute elapsed value.
    pub fn set(&self, elapsed: Duration) {
        *self.now.lock().unwrap() = elapsed;
    }
}

impl ShowClock for ManualClock {
    fn elapsed(&self) -> Duration {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_moves_forward() {
        let clock = WallClock::new();
        let a = clock.elapsed();
        std::thread::sleep(Duration::from_millis(10));
        let b = clock.elapsed();
        assert!(b > a);
    }

    #[test]
    fn manual_clock_starts_at_zero() {
        let clock = ManualClock::new();
        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert_eq!(clock.elapsed_secs(), 0.0);
    }

    #[test]
    fn manual_clock_advance_accumulates() {
        let clock = ManualClock::new();
        clock.advance_secs(1.5);
        clock.advance_secs(2.0);
        assert!((clock.elapsed_secs() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance_secs(4.0);
        assert!((other.elapsed_secs() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn manual_clock_set_absolute() {
        let clock = ManualClock::new();
        clock.advance_secs(10.0);
        clock.set(Duration::from_secs(2));
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }
}
