///
/// Preemption ticker.
///
/// `Trigger::start` captures the calling OS thread and spawns a ticker that
/// signals it once per period until the trigger is stopped. A disabled
/// trigger spawns nothing and installs nothing.
///
/// ## Ticker Thread Design
///
/// The ticker sleeps on a `Condvar` with a deadline one period away, so a
/// stop request wakes it immediately instead of waiting out the period.
/// Spurious wakeups re-wait for the remainder of the period.
///

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::errors::PreemptError;
use crate::signal::{self, PREEMPT_SIGNAL};

struct TickerState {
    stopped: Mutex<bool>,
    condvar: Condvar,
    ticks: AtomicU64,
}

impl TickerState {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
            ticks: AtomicU64::new(0),
        }
    }
}

struct Ticker {
    state: Arc<TickerState>,
    handle: JoinHandle<()>,
}

pub struct Trigger {
    ticker: Option<Ticker>,
    period: Duration,
    ticks: u64,
}

impl Trigger {
    /// Start forcing `hook` on the calling OS thread every `period`.
    ///
    /// With `enabled` false the returned trigger is inert.
    pub fn start(enabled: bool, period: Duration, hook: fn()) -> Result<Self, PreemptError> {
        if !enabled {
            return Ok(Self::inert(period));
        }
        if period.is_zero() {
            return Err(PreemptError::InvalidPeriod);
        }

        signal::install(hook)?;

        let target = unsafe { libc::pthread_self() };
        let state = Arc::new(TickerState::new());
        let ticker_state = Arc::clone(&state);

        let handle = thread::Builder::new()
            .name("spindle-preempt".to_string())
            .spawn(move || ticker_loop(ticker_state, target, period))
            .map_err(PreemptError::Ticker)?;

        debug!(period_ms = period.as_millis() as u64, "preemption started");

        Ok(Self {
            ticker: Some(Ticker { state, handle }),
            period,
            ticks: 0,
        })
    }

    pub fn inert(period: Duration) -> Self {
        Self {
            ticker: None,
            period,
            ticks: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Signals sent so far, including those sent before `stop`
    pub fn ticks(&self) -> u64 {
        match &self.ticker {
            Some(ticker) => ticker.state.ticks.load(Ordering::Relaxed),
            None => self.ticks,
        }
    }

    /// Stop and join the ticker. Safe to call on an inert or stopped trigger.
    pub fn stop(&mut self) {
        let Some(ticker) = self.ticker.take() else {
            return;
        };

        {
            let mut stopped = ticker.state.stopped.lock().unwrap_or_else(|e| e.into_inner());
            *stopped = true;
            ticker.state.condvar.notify_one();
        }
        let _ = ticker.handle.join();

        self.ticks = ticker.state.ticks.load(Ordering::Relaxed);
        debug!(ticks = self.ticks, "preemption stopped");
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ticker_loop(state: Arc<TickerState>, target: libc::pthread_t, period: Duration) {
    let mut stopped = state.stopped.lock().unwrap_or_else(|e| e.into_inner());

    loop {
        let deadline = Instant::now() + period;
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = state
                .condvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            stopped = guard;
        }

        if *stopped {
            return;
        }

        unsafe {
            libc::pthread_kill(target, PREEMPT_SIGNAL);
        }
        state.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static HOOK_CALLS: AtomicU64 = AtomicU64::new(0);

    fn count_hook() {
        HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_disabled_trigger_is_inert() {
        let mut trigger = Trigger::start(false, Duration::from_millis(10), count_hook).unwrap();
        assert!(!trigger.is_active());
        assert_eq!(trigger.ticks(), 0);
        trigger.stop();
        trigger.stop();
    }

    #[test]
    fn test_zero_period_rejected() {
        let err = Trigger::start(true, Duration::ZERO, count_hook).err().unwrap();
        assert!(matches!(err, PreemptError::InvalidPeriod));
    }

    #[test]
    fn test_trigger_fires_hook_on_calling_thread() {
        let mut trigger = Trigger::start(true, Duration::from_millis(2), count_hook).unwrap();
        assert!(trigger.is_active());
        assert!(signal::is_installed());

        let give_up = Instant::now() + Duration::from_secs(5);
        while HOOK_CALLS.load(Ordering::SeqCst) < 3 && Instant::now() < give_up {
            thread::sleep(Duration::from_millis(1));
        }

        trigger.stop();
        assert!(!trigger.is_active());
        assert!(HOOK_CALLS.load(Ordering::SeqCst) >= 3);
        assert!(trigger.ticks() >= 3);
        assert_eq!(trigger.period(), Duration::from_millis(2));
    }
}
