///
/// Masking the preemption signal.
///
/// The mask is per OS thread. A context switch through `swapcontext` saves
/// and restores the mask with the rest of the context, so each green thread
/// effectively carries its own.
///

use std::marker::PhantomData;

use crate::signal::{PREEMPT_SIGNAL, preempt_set};

/// Blocks the preemption signal until dropped, then restores the previous mask
pub struct PreemptGuard {
    previous: libc::sigset_t,
    _not_send: PhantomData<*const ()>,
}

impl PreemptGuard {
    pub fn new() -> Self {
        let set = preempt_set();
        let mut previous: libc::sigset_t = unsafe { std::mem::zeroed() };
        unsafe {
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut previous);
        }
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Default for PreemptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PreemptGuard {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, std::ptr::null_mut());
        }
    }
}

/// Block the preemption signal until `enable` is called
pub fn disable() {
    let set = preempt_set();
    unsafe {
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

/// Unblock the preemption signal
pub fn enable() {
    let set = preempt_set();
    unsafe {
        libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
    }
}

/// Whether the calling OS thread currently blocks the preemption signal
pub fn is_masked() -> bool {
    unsafe {
        let mut current: libc::sigset_t = std::mem::zeroed();
        libc::pthread_sigmask(libc::SIG_BLOCK, std::ptr::null(), &mut current);
        libc::sigismember(&current, PREEMPT_SIGNAL) == 1
    }
}
