///
/// Scheduler error types.
///
/// Failures from the stack/context provider and the preemption trigger are
/// wrapped as-is; the remaining variants describe misuse of the scheduler
/// API or a run that ended with threads still blocked.
///

use spindle_std_context::ContextError;
use spindle_std_preempt::PreemptError;
use thiserror::Error;

use crate::tcb::ThreadHandle;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("No scheduler is running on this thread")]
    NotRunning,

    #[error("A scheduler is already running on this thread")]
    AlreadyRunning,

    #[error("Thread {0:?} is not blocked")]
    NotBlocked(ThreadHandle),

    /// The run ended with threads still blocked. Their stacks were freed
    /// without unwinding, so whatever they owned was leaked.
    #[error("Scheduler finished with {count} blocked thread(s) never unblocked")]
    Stranded { count: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Preempt(#[from] PreemptError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
