///
/// Saved execution contexts.
///
/// A `Context` owns a heap-allocated `ucontext_t`. The image never moves once
/// allocated (glibc keeps pointers into it), so the `Context` value itself is
/// free to move between queues and structs.
///
/// ## Starting a Context
///
/// `makecontext` only passes `int` arguments, so `prepare` stores the entry
/// function and its argument in a boxed `Start` record owned by the context
/// and hands the record's address to a trampoline split across two `u32`s.
/// The entry function must never return: there is no context to return to,
/// and the trampoline aborts the process if it does.
///

use std::ffi::{c_int, c_void};
use std::fmt;
use std::io;
use std::ptr::NonNull;

use crate::errors::ContextError;
use crate::stack::Stack;

/// Function a prepared context starts executing
pub type EntryFn = extern "C" fn(*mut c_void);

#[derive(Clone, Copy)]
struct Start {
    entry: EntryFn,
    arg: *mut c_void,
}

pub struct Context {
    image: NonNull<libc::ucontext_t>,
    start: Option<Box<Start>>,
}

/// Borrow-free reference to a context image, used for switching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawContext(NonNull<libc::ucontext_t>);

impl Context {
    /// An empty image, filled in by the first switch away from it
    pub fn new() -> Self {
        let image = Box::new(unsafe { std::mem::zeroed::<libc::ucontext_t>() });
        Self {
            image: NonNull::from(Box::leak(image)),
            start: None,
        }
    }

    /// Set up the image so that resuming it runs `entry(arg)` on `stack`.
    ///
    /// The stack must outlive every switch into this context.
    pub fn prepare(
        &mut self,
        stack: &Stack,
        entry: EntryFn,
        arg: *mut c_void,
    ) -> Result<(), ContextError> {
        let image = self.image.as_ptr();

        unsafe {
            if libc::getcontext(image) != 0 {
                return Err(ContextError::Capture(io::Error::last_os_error()));
            }
            (*image).uc_stack.ss_sp = stack.bottom() as *mut c_void;
            (*image).uc_stack.ss_size = stack.size();
            (*image).uc_stack.ss_flags = 0;
            (*image).uc_link = std::ptr::null_mut();
        }

        let start = Box::new(Start { entry, arg });
        let addr = &*start as *const Start as usize as u64;

        unsafe {
            let trampoline: extern "C" fn() =
                std::mem::transmute::<extern "C" fn(u32, u32), extern "C" fn()>(trampoline);
            libc::makecontext(image, trampoline, 2, (addr >> 32) as u32, addr as u32);
        }

        self.start = Some(start);
        Ok(())
    }

    /// Drop `signal` from the mask the context starts with.
    ///
    /// The image inherits the mask in force when `prepare` ran; callers that
    /// prepare contexts with a signal blocked use this to start unblocked.
    pub fn unblock_on_entry(&mut self, signal: c_int) {
        unsafe {
            libc::sigdelset(&mut (*self.image.as_ptr()).uc_sigmask, signal);
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.start.is_some()
    }

    pub fn raw(&self) -> RawContext {
        RawContext(self.image)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(self.image.as_ptr()));
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("image", &self.image)
            .field("prepared", &self.is_prepared())
            .finish()
    }
}

/// Save the running context into `from` and resume `to`.
///
/// Returns once some later switch targets `from` again.
///
/// # Safety
/// Both images must be alive for the whole suspension, and `to` must either
/// have been prepared or have been saved by an earlier switch.
pub unsafe fn switch(from: RawContext, to: RawContext) -> Result<(), ContextError> {
    if unsafe { libc::swapcontext(from.0.as_ptr(), to.0.as_ptr()) } != 0 {
        return Err(ContextError::Switch(io::Error::last_os_error()));
    }
    Ok(())
}

extern "C" fn trampoline(hi: u32, lo: u32) {
    let addr = ((hi as u64) << 32 | lo as u64) as usize;
    let start = unsafe { *(addr as *const Start) };
    (start.entry)(start.arg);
    std::process::abort();
}
