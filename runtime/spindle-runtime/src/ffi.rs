///
/// C ABI for the scheduler.
///
/// Mirrors the classic uthread interface so C programs can link
/// libspindle_runtime.a directly. Functions returning `c_int` use `0` for
/// success and `-1` for failure. A thread function receives the `arg`
/// pointer it was created with; returning from it exits the thread.
///

use std::ffi::{c_int, c_void};

use tracing::warn;

use crate::scheduler;
use crate::tcb::ThreadHandle;

pub type ThreadFn = extern "C" fn(*mut c_void);

fn entry(func: ThreadFn, arg: *mut c_void) -> impl FnOnce() + 'static {
    let arg = arg as usize;
    move || func(arg as *mut c_void)
}

#[unsafe(no_mangle)]
pub extern "C" fn spindle_run(preempt: bool, func: Option<ThreadFn>, arg: *mut c_void) -> c_int {
    let Some(func) = func else {
        return -1;
    };
    match scheduler::run(preempt, entry(func, arg)) {
        Ok(()) => 0,
        Err(err) => {
            warn!(%err, "spindle_run failed");
            -1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn spindle_create(func: Option<ThreadFn>, arg: *mut c_void) -> c_int {
    let Some(func) = func else {
        return -1;
    };
    match scheduler::spawn(entry(func, arg)) {
        Ok(_) => 0,
        Err(err) => {
            warn!(%err, "spindle_create failed");
            -1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn spindle_yield() {
    scheduler::yield_now();
}

#[unsafe(no_mangle)]
pub extern "C" fn spindle_exit() {
    scheduler::exit();
}

#[unsafe(no_mangle)]
pub extern "C" fn spindle_block() {
    scheduler::block();
}

#[unsafe(no_mangle)]
pub extern "C" fn spindle_unblock(handle: *mut c_void) -> c_int {
    let Some(handle) = ThreadHandle::from_ptr(handle) else {
        return -1;
    };
    match scheduler::unblock(handle) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Opaque handle of the running thread, null outside a scheduler
#[unsafe(no_mangle)]
pub extern "C" fn spindle_current() -> *mut c_void {
    scheduler::current().map_or(std::ptr::null_mut(), ThreadHandle::as_ptr)
}

#[unsafe(no_mangle)]
pub extern "C" fn spindle_preempt_disable() {
    spindle_std_preempt::disable();
}

#[unsafe(no_mangle)]
pub extern "C" fn spindle_preempt_enable() {
    spindle_std_preempt::enable();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicPtr, Ordering};

    static SUM: AtomicI64 = AtomicI64::new(0);

    extern "C" fn add_arg(arg: *mut c_void) {
        SUM.fetch_add(arg as usize as i64, Ordering::SeqCst);
    }

    extern "C" fn spawn_adders(_arg: *mut c_void) {
        for i in 1..=4 {
            assert_eq!(spindle_create(Some(add_arg), i as usize as *mut c_void), 0);
        }
        spindle_yield();
    }

    #[test]
    fn test_run_and_create() {
        SUM.store(0, Ordering::SeqCst);
        assert_eq!(spindle_run(false, Some(spawn_adders), std::ptr::null_mut()), 0);
        assert_eq!(SUM.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_null_function_rejected() {
        assert_eq!(spindle_run(false, None, std::ptr::null_mut()), -1);
        assert_eq!(spindle_create(None, std::ptr::null_mut()), -1);
    }

    #[test]
    fn test_outside_scheduler() {
        assert!(spindle_current().is_null());
        assert_eq!(spindle_create(Some(add_arg), std::ptr::null_mut()), -1);
        assert_eq!(spindle_unblock(std::ptr::null_mut()), -1);
        spindle_yield();
        spindle_exit();
        spindle_block();
    }

    static WAITER: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
    static STEPS: AtomicI64 = AtomicI64::new(0);

    extern "C" fn waiter(_arg: *mut c_void) {
        WAITER.store(spindle_current(), Ordering::SeqCst);
        spindle_block();
        STEPS.fetch_add(10, Ordering::SeqCst);
    }

    extern "C" fn waker(_arg: *mut c_void) {
        STEPS.fetch_add(1, Ordering::SeqCst);
        assert_eq!(spindle_unblock(WAITER.load(Ordering::SeqCst)), 0);
        // A second unblock finds nothing blocked.
        assert_eq!(spindle_unblock(WAITER.load(Ordering::SeqCst)), -1);
    }

    extern "C" fn block_main(_arg: *mut c_void) {
        assert_eq!(spindle_create(Some(waiter), std::ptr::null_mut()), 0);
        assert_eq!(spindle_create(Some(waker), std::ptr::null_mut()), 0);
    }

    #[test]
    fn test_block_and_unblock() {
        STEPS.store(0, Ordering::SeqCst);
        assert_eq!(spindle_run(false, Some(block_main), std::ptr::null_mut()), 0);
        assert_eq!(STEPS.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_preempt_disable_enable() {
        spindle_preempt_disable();
        assert!(spindle_std_preempt::is_masked());
        spindle_preempt_enable();
        assert!(!spindle_std_preempt::is_masked());
    }
}
