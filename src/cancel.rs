//! Cooperative cancellation tokens.
//!
//! A `CancelToken` is a cheap, cloneable signal shared between the driver
//! and whatever is currently executing. Cancellation is cooperative: the
//! running side polls the token at its suspension points and returns
//! promptly once it fires. Nothing is ever forcibly terminated.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep inside a cancellable wait.
const POLL_SLICE: Duration = Duration::from_millis(20);

/// Shared cancellation signal. Clones observe the same flag.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if the token fires.
    ///
    /// Returns `true` if the full duration elapsed, `false` on
    /// cancellation. Worst-case wake latency is one poll slice.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(POLL_SLICE));
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
