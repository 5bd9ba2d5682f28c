//!
//! spindle-runtime - Green Thread Scheduler
//!
//! Runs any number of lightweight threads on the calling OS thread. Threads
//! switch voluntarily (`yield_now`, `block`, `exit`) or, when preemption is
//! enabled, whenever the preemption tick fires.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spindle_runtime::{run, spawn, yield_now};
//!
//! run(false, || {
//!     spawn(|| println!("second")).unwrap();
//!     println!("first");
//!     yield_now();
//! })?;
//! ```
//!
//! ## Scheduling Model
//!
//! - The head of the ready queue is the running thread; rotation moves it to
//!   the tail and resumes the new head
//! - Blocked threads sit in a separate queue and only return to the ready
//!   queue through `unblock`
//! - `run` returns once the ready queue drains
//!
//! ## C ABI
//!
//! The `ffi` module exports `spindle_*` functions for linking the static
//! library into C programs.
//!

pub mod config;
pub mod errors;
pub mod ffi;
pub mod scheduler;
mod tcb;

pub use config::SchedulerConfig;
pub use errors::SchedulerError;
pub use scheduler::*;
pub use spindle_std_preempt::PreemptGuard;
pub use tcb::ThreadHandle;
