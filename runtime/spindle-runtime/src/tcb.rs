///
/// Thread control blocks.
///
/// A TCB is heap-allocated once and referred to by its address for the rest
/// of its life. The queues hold these addresses, so moving a thread between
/// queues never moves the TCB itself, and the saved context inside it stays
/// where the context switch expects it.
///

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use spindle_std_context::{Context, EntryFn, RawContext, Stack};
use spindle_std_preempt::PREEMPT_SIGNAL;

use crate::errors::SchedulerError;

pub(crate) type Entry = Box<dyn FnMut()>;

/// Box a one-shot entry so the thread can run it without consuming the box.
///
/// The box is then freed by the scheduler with preemption masked rather than
/// inside the call, where a forced switch could split the allocator.
pub(crate) fn entry<F>(f: F) -> Entry
where
    F: FnOnce() + 'static,
{
    let mut f = Some(f);
    Box::new(move || {
        if let Some(f) = f.take() {
            f();
        }
    })
}

pub(crate) struct Tcb {
    context: Context,
    stack: Stack,
    entry: Option<Entry>,
}

pub(crate) type TcbPtr = NonNull<Tcb>;

impl Tcb {
    /// Allocate a TCB whose context starts in `start(tcb)`.
    ///
    /// Nothing is leaked on failure: a stack allocated before a failed
    /// context setup is released with the TCB.
    pub(crate) fn create(
        stack_size: usize,
        entry: Entry,
        start: EntryFn,
    ) -> Result<TcbPtr, SchedulerError> {
        let stack = Stack::allocate(stack_size)?;
        let tcb = NonNull::from(Box::leak(Box::new(Tcb {
            context: Context::new(),
            stack,
            entry: Some(entry),
        })));

        let this = unsafe { &mut *tcb.as_ptr() };
        if let Err(err) = this
            .context
            .prepare(&this.stack, start, tcb.as_ptr() as *mut c_void)
        {
            unsafe { Tcb::destroy(tcb) };
            return Err(err.into());
        }
        this.context.unblock_on_entry(PREEMPT_SIGNAL);

        Ok(tcb)
    }

    /// Release the stack and the TCB.
    ///
    /// # Safety
    /// `tcb` must come from `create`, be in no queue, and not be running.
    pub(crate) unsafe fn destroy(tcb: TcbPtr) {
        unsafe { drop(Box::from_raw(tcb.as_ptr())) };
    }

    /// # Safety
    /// `tcb` must be alive.
    pub(crate) unsafe fn context(tcb: TcbPtr) -> RawContext {
        unsafe { (*tcb.as_ptr()).context.raw() }
    }

    /// # Safety
    /// `tcb` must be alive.
    pub(crate) unsafe fn take_entry(tcb: TcbPtr) -> Option<Entry> {
        unsafe { (*tcb.as_ptr()).entry.take() }
    }
}

/// Identifies a green thread for `unblock`.
///
/// A handle is only ever compared by address, never dereferenced, so a stale
/// handle at worst fails to match.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle(pub(crate) TcbPtr);

unsafe impl Send for ThreadHandle {}
unsafe impl Sync for ThreadHandle {}

impl ThreadHandle {
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr() as *mut c_void
    }

    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr as *mut Tcb).map(ThreadHandle)
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadHandle({:p})", self.0.as_ptr())
    }
}
