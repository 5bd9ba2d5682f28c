//!
//! spindle-std-context - Stacks and Execution Contexts
//!
//! Everything the scheduler needs to give a green thread its own flow of
//! control:
//!
//! - `Stack` owns an mmap'd region with a guard page at its low end
//! - `Context` owns a saved register image that can be prepared to start a
//!   function on a `Stack`
//! - `switch` suspends one context and resumes another
//!
//! ## Platform Support
//!
//! Linux with glibc. The register images are `ucontext_t`, so a switch also
//! saves and restores the signal mask of each side.
//!

pub mod context;
pub mod errors;
pub mod stack;

pub use context::*;
pub use errors::ContextError;
pub use stack::*;
