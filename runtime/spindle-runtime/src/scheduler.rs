//!
//! Round-robin Green Thread Scheduler
//!
//! The scheduler core owns two queues of TCB addresses:
//!
//! - The ready queue, in rotation order. Its head is the running thread, so
//!   "current" is never tracked separately.
//! - The blocked queue, holding threads that only `unblock` can bring back.
//!
//! The core is created by `Scheduler::run` and torn down when it returns. While
//! it exists, a per-OS-thread pointer makes it reachable from the free
//! functions below, from thread code, and from the preemption hook.
//!
//! ## Switching
//!
//! Yield and block hand the processor straight to the next ready thread. Exit
//! cannot free the stack it is still running on, so it parks the dead TCB in
//! a reap slot and switches to the run loop, which frees it before resuming
//! the next head.
//!
//! ## Preemption Safety
//!
//! Every queue mutation and every switch runs with the preemption signal
//! masked. A context carries its own mask through `swapcontext`, so a thread
//! resumed inside `yield_now` unmasks when its guard drops, and a fresh thread
//! starts unmasked.
//!

use std::cell::Cell;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};

use spindle_std_context::{self as context, Context, RawContext};
use spindle_std_preempt::{PreemptGuard, Trigger};
use spindle_std_queue::Queue;
use tracing::{debug, error, trace, warn};

use crate::config::SchedulerConfig;
use crate::errors::SchedulerError;
use crate::tcb::{self, Entry, Tcb, TcbPtr, ThreadHandle};

struct Core {
    ready: Queue<TcbPtr>,
    blocked: Queue<TcbPtr>,
    bootstrap: Context,
    reaped: Option<TcbPtr>,
    trigger: Trigger,
    stack_size: usize,
}

impl Core {
    fn new(config: &SchedulerConfig, trigger: Trigger) -> Self {
        Self {
            ready: Queue::with_capacity(config.queue_capacity),
            blocked: Queue::with_capacity(config.queue_capacity),
            bootstrap: Context::new(),
            reaped: None,
            trigger,
            stack_size: config.stack_size,
        }
    }

    fn current(&self) -> Option<TcbPtr> {
        self.ready.peek().copied()
    }

    fn admit(&mut self, entry: Entry) -> Result<ThreadHandle, SchedulerError> {
        let tcb = Tcb::create(self.stack_size, entry, thread_entry)?;
        self.ready.enqueue(tcb);
        Ok(ThreadHandle(tcb))
    }

    /// Move the running thread to the tail and pick the new head.
    ///
    /// Current is dequeued before the head is read, so the target is never
    /// the yielding thread unless it is the only one ready.
    fn rotate(&mut self) -> Option<(RawContext, RawContext)> {
        let current = self.ready.dequeue()?;
        self.ready.enqueue(current);
        let next = *self.ready.peek()?;
        if next == current {
            return None;
        }
        unsafe { Some((Tcb::context(current), Tcb::context(next))) }
    }

    fn retire(&mut self) -> Option<(RawContext, RawContext)> {
        let current = self.ready.dequeue()?;
        debug_assert!(self.reaped.is_none());
        self.reaped = Some(current);
        unsafe { Some((Tcb::context(current), self.bootstrap.raw())) }
    }

    fn park(&mut self) -> Option<(RawContext, RawContext)> {
        let current = self.ready.dequeue()?;
        self.blocked.enqueue(current);
        let to = match self.ready.peek() {
            Some(&next) => unsafe { Tcb::context(next) },
            None => self.bootstrap.raw(),
        };
        unsafe { Some((Tcb::context(current), to)) }
    }

    fn wake(&mut self, handle: ThreadHandle) -> Result<(), SchedulerError> {
        let tcb = self
            .blocked
            .delete(&handle.0)
            .ok_or(SchedulerError::NotBlocked(handle))?;
        debug_assert!(!self.ready.contains(&tcb));
        self.ready.enqueue(tcb);
        Ok(())
    }

    fn reap(&mut self) {
        if let Some(tcb) = self.reaped.take() {
            unsafe { Tcb::destroy(tcb) };
        }
    }

    /// Free the last exited thread and return the contexts to dispatch the head
    fn next_dispatch(&mut self) -> Option<(RawContext, RawContext)> {
        self.reap();
        let head = *self.ready.peek()?;
        unsafe { Some((self.bootstrap.raw(), Tcb::context(head))) }
    }
}

/// Frees every remaining TCB. Threads still in a queue are discarded without
/// unwinding their stacks.
impl Drop for Core {
    fn drop(&mut self) {
        self.reap();
        while let Some(tcb) = self.ready.dequeue() {
            unsafe { Tcb::destroy(tcb) };
        }
        while let Some(tcb) = self.blocked.dequeue() {
            unsafe { Tcb::destroy(tcb) };
        }
    }
}

thread_local! {
    static ACTIVE: Cell<*mut Core> = const { Cell::new(ptr::null_mut()) };
}

fn active_core() -> *mut Core {
    ACTIVE.try_with(|active| active.get()).unwrap_or(ptr::null_mut())
}

/// Run `f` against this OS thread's scheduler core, if one is running.
///
/// Callers hold a `PreemptGuard` and must not switch inside `f`.
fn with_core<R>(f: impl FnOnce(&mut Core) -> R) -> Option<R> {
    let core = active_core();
    if core.is_null() {
        return None;
    }
    Some(f(unsafe { &mut *core }))
}

/// Installs a core as this OS thread's active scheduler for its lifetime
struct Session {
    core: NonNull<Core>,
}

impl Session {
    fn enter(core: Core) -> Self {
        let core = NonNull::from(Box::leak(Box::new(core)));
        ACTIVE.with(|active| active.set(core.as_ptr()));
        Self { core }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(ptr::null_mut()));
        unsafe { drop(Box::from_raw(self.core.as_ptr())) };
    }
}

fn switch_to(from: RawContext, to: RawContext) {
    if let Err(err) = unsafe { context::switch(from, to) } {
        // The queues already name `to` as running; there is no state to return to.
        error!(%err, "context switch failed");
        std::process::abort();
    }
}

extern "C" fn thread_entry(arg: *mut c_void) {
    let Some(tcb) = NonNull::new(arg as *mut Tcb) else {
        std::process::abort();
    };

    let entry = {
        let _mask = PreemptGuard::new();
        unsafe { Tcb::take_entry(tcb) }
    };

    if let Some(mut entry) = entry {
        let outcome = panic::catch_unwind(AssertUnwindSafe(&mut entry));

        let _mask = PreemptGuard::new();
        if outcome.is_err() {
            error!(thread = ?ThreadHandle(tcb), "thread panicked, exiting it");
        }
        drop(outcome);
        drop(entry);
    }

    exit();
}

/// Preemption hook: a forced yield, silent so it never touches a writer the
/// interrupted thread may hold.
fn preempt_tick() {
    let _mask = PreemptGuard::new();
    if let Some((from, to)) = with_core(Core::rotate).flatten() {
        switch_to(from, to);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run `main` as the first green thread and return once every thread
    /// has exited.
    ///
    /// With `preempt` set, the running thread is forced to yield every
    /// `timeslice_ms`. Fails if the first thread cannot be created, or with
    /// `Stranded` if the ready queue drained while threads were still blocked.
    ///
    /// Stranded threads are never resumed. Their stacks are unmapped, but
    /// nothing on them is unwound: values a stranded thread owns, including
    /// what its closure captured, are leaked rather than dropped.
    pub fn run<F>(&self, preempt: bool, main: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + 'static,
    {
        self.config.validate()?;
        if is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let _mask = PreemptGuard::new();
        let trigger = Trigger::start(preempt, self.config.timeslice(), preempt_tick)?;
        debug!(
            preempt,
            stack_size = self.config.stack_size,
            period_ms = trigger.period().as_millis() as u64,
            "scheduler started"
        );
        let session = Session::enter(Core::new(&self.config, trigger));

        if let Err(err) = spawn(main) {
            with_core(|core| core.trigger.stop());
            drop(session);
            return Err(err);
        }

        while let Some((from, to)) = with_core(Core::next_dispatch).flatten() {
            switch_to(from, to);
        }

        let (stranded, ticks) = with_core(|core| {
            core.trigger.stop();
            (core.blocked.len(), core.trigger.ticks())
        })
        .unwrap_or((0, 0));
        drop(session);

        if stranded > 0 {
            warn!(count = stranded, ticks, "scheduler finished with blocked threads");
            return Err(SchedulerError::Stranded { count: stranded });
        }

        debug!(ticks, "scheduler finished");
        Ok(())
    }
}

/// Run `main` on a scheduler with the default configuration
pub fn run<F>(preempt: bool, main: F) -> Result<(), SchedulerError>
where
    F: FnOnce() + 'static,
{
    Scheduler::default().run(preempt, main)
}

/// Whether a scheduler is running on this OS thread
pub fn is_running() -> bool {
    !active_core().is_null()
}

/// Create a thread that runs `f` after every thread already ready has had
/// its turn. Does not switch.
pub fn spawn<F>(f: F) -> Result<ThreadHandle, SchedulerError>
where
    F: FnOnce() + 'static,
{
    let _mask = PreemptGuard::new();
    let handle = with_core(|core| core.admit(tcb::entry(f))).ok_or(SchedulerError::NotRunning)??;
    debug!(thread = ?handle, "thread created");
    Ok(handle)
}

/// Give the processor to the next ready thread.
///
/// Returns when rotation comes back around. A no-op outside a scheduler or
/// when no other thread is ready.
pub fn yield_now() {
    let _mask = PreemptGuard::new();
    if let Some((from, to)) = with_core(Core::rotate).flatten() {
        trace!("yield");
        switch_to(from, to);
    }
}

/// Terminate the running thread.
///
/// Never returns when called from a green thread; a no-op otherwise.
pub fn exit() {
    let _mask = PreemptGuard::new();
    let Some((from, to)) = with_core(Core::retire).flatten() else {
        return;
    };
    trace!("exit");
    switch_to(from, to);

    // The run loop frees this context without ever resuming it.
    std::process::abort();
}

/// Suspend the running thread until another thread calls `unblock` on it.
///
/// A no-op outside a scheduler.
pub fn block() {
    let _mask = PreemptGuard::new();
    if let Some((from, to)) = with_core(Core::park).flatten() {
        trace!("block");
        switch_to(from, to);
    }
}

/// Make a blocked thread runnable again, at the tail of the ready queue.
///
/// Does not switch. Fails with `NotBlocked`, leaving both queues untouched,
/// if `handle` is not in the blocked queue.
pub fn unblock(handle: ThreadHandle) -> Result<(), SchedulerError> {
    let _mask = PreemptGuard::new();
    let result = with_core(|core| core.wake(handle)).ok_or(SchedulerError::NotRunning)?;
    match &result {
        Ok(()) => debug!(thread = ?handle, "thread unblocked"),
        Err(err) => warn!(thread = ?handle, %err, "unblock ignored"),
    }
    result
}

/// The running thread, or `None` outside a scheduler
pub fn current() -> Option<ThreadHandle> {
    let _mask = PreemptGuard::new();
    with_core(|core| core.current()).flatten().map(ThreadHandle)
}

/// Threads in the ready queue, the running one included
pub fn ready_count() -> usize {
    let _mask = PreemptGuard::new();
    with_core(|core| core.ready.len()).unwrap_or(0)
}

pub fn blocked_count() -> usize {
    let _mask = PreemptGuard::new();
    with_core(|core| core.blocked.len()).unwrap_or(0)
}

/// Whether the running scheduler has a live preemption trigger
pub fn preemption_active() -> bool {
    let _mask = PreemptGuard::new();
    with_core(|core| core.trigger.is_active()).unwrap_or(false)
}

/// Hold off preemption until the returned guard drops.
///
/// Needed around anything a forced switch must not split, such as writing to
/// stdout or allocating while other threads may be preempted mid-allocation.
pub fn no_preempt() -> PreemptGuard {
    PreemptGuard::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_outside_scheduler_is_inert() {
        assert!(!is_running());
        assert!(current().is_none());
        assert_eq!(ready_count(), 0);
        assert_eq!(blocked_count(), 0);
        assert!(!preemption_active());

        yield_now();
        block();
        exit();
        exit();

        assert!(matches!(spawn(|| {}), Err(SchedulerError::NotRunning)));
    }

    #[test]
    fn test_rotation_never_selects_current() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&order);

        run(false, move || {
            for name in ["a", "b"] {
                let log = Rc::clone(&log);
                spawn(move || {
                    for _ in 0..2 {
                        log.borrow_mut().push(name);
                        yield_now();
                    }
                })
                .unwrap();
            }
        })
        .unwrap();

        assert_eq!(*order.borrow(), vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_lone_thread_yield_returns_immediately() {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);

        run(false, move || {
            for _ in 0..10 {
                yield_now();
                counter.set(counter.get() + 1);
            }
        })
        .unwrap();

        assert_eq!(hits.get(), 10);
    }

    #[test]
    fn test_nested_run_rejected() {
        let nested = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&nested);

        run(false, move || {
            *slot.borrow_mut() = Some(run(false, || {}));
        })
        .unwrap();

        assert!(matches!(
            nested.borrow_mut().take(),
            Some(Err(SchedulerError::AlreadyRunning))
        ));
        assert!(!is_running());
    }

    #[test]
    fn test_invalid_config_rejected_before_start() {
        let scheduler = Scheduler::new(SchedulerConfig::default().with_stack_size(16));
        let err = scheduler.run(false, || {}).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
        assert!(!is_running());
    }

    #[test]
    fn test_panicking_thread_is_treated_as_exit() {
        let survived = Rc::new(Cell::new(false));
        let flag = Rc::clone(&survived);

        run(false, move || {
            spawn(|| panic!("boom")).unwrap();
            spawn(move || flag.set(true)).unwrap();
        })
        .unwrap();

        assert!(survived.get());
    }
}
