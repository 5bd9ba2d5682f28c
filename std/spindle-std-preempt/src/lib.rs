//!
//! spindle-std-preempt - Preemption Trigger
//!
//! Forces a running green thread to give up the processor at a fixed period.
//!
//! ## Delivery
//!
//! A background ticker thread sleeps one period at a time and then sends
//! `SIGVTALRM` straight to the OS thread that started it (`pthread_kill`).
//! The signal handler is installed once per process and forwards to a single
//! registered hook, which the scheduler points at its yield operation.
//! Because delivery is directed, schedulers running on different OS threads
//! each see only their own ticks.
//!
//! ## Masking
//!
//! Code that must not be interrupted by the hook (queue mutation, the context
//! switch itself, allocation) runs under a `PreemptGuard`. Ticks that arrive
//! while masked stay pending and are delivered once the mask is lifted.
//!

pub mod errors;
pub mod mask;
pub mod signal;
pub mod trigger;

pub use errors::PreemptError;
pub use mask::*;
pub use signal::PREEMPT_SIGNAL;
pub use trigger::*;
