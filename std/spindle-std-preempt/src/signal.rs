///
/// Process-wide preemption signal handler.
///
/// The handler is installed the first time any trigger starts and stays
/// installed for the life of the process. Uninstalling would race with ticks
/// already in flight: a pending `SIGVTALRM` delivered under the default
/// disposition terminates the process. With no hook registered, or a hook
/// that finds nothing to do, a stray tick is harmless.
///

use std::ffi::c_int;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::PreemptError;

/// Signal used to force a yield
pub const PREEMPT_SIGNAL: c_int = libc::SIGVTALRM;

static HOOK: AtomicUsize = AtomicUsize::new(0);
static INSTALLED: Mutex<bool> = Mutex::new(false);

/// Point the handler at `hook` and make sure the handler is in place
pub fn install(hook: fn()) -> Result<(), PreemptError> {
    HOOK.store(hook as usize, Ordering::Release);

    let mut installed = INSTALLED.lock().unwrap_or_else(|e| e.into_inner());
    if *installed {
        return Ok(());
    }

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as extern "C" fn(c_int) as usize;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);

        if libc::sigaction(PREEMPT_SIGNAL, &action, std::ptr::null_mut()) != 0 {
            return Err(PreemptError::InstallHandler(io::Error::last_os_error()));
        }
    }

    *installed = true;
    Ok(())
}

#[cfg(test)]
pub(crate) fn is_installed() -> bool {
    *INSTALLED.lock().unwrap_or_else(|e| e.into_inner())
}

extern "C" fn on_signal(_signal: c_int) {
    let hook = HOOK.load(Ordering::Acquire);
    if hook != 0 {
        let hook: fn() = unsafe { std::mem::transmute::<usize, fn()>(hook) };
        hook();
    }
}

/// The set containing only `PREEMPT_SIGNAL`
pub(crate) fn preempt_set() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, PREEMPT_SIGNAL);
        set
    }
}
