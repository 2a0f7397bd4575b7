//! airtime — orchestration core for an interactive radio-broadcast
//! simulator: a sequential, cancellable unit scheduler, a show-clock
//! timer service behind a thread-safe queue, and the state machine that
//! decides what goes on the air next.

pub mod broadcast_loop;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod context;
pub mod dialogue;
pub mod sim;
pub mod sources;
pub mod state_machine;
pub mod timer;
pub mod timer_queue;
pub mod transcript;
pub mod unit;
