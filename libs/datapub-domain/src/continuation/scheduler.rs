//! Poll pacing
//!
//! [`PollScheduler`] turns absolute `retry_not_before` instants into blocking
//! waits on the calling thread. Status checks are issued strictly after their
//! deadline, never earlier.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::continuation::error::Interrupted;
use crate::ports::{Clock, Sleeper};

/// Wall clock backed by `chrono::Utc::now`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Sleeper backed by `std::thread::sleep`; never interrupted
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        std::thread::sleep(duration);
        Ok(())
    }
}

/// Cancellable sleeper
///
/// Clones share state: calling [`cancel`](Self::cancel) on any clone wakes
/// every thread currently waiting on another clone, and makes every later
/// wait fail immediately.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt current and future waits
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Sleeper for CancelToken {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now() + duration;
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        loop {
            if *cancelled {
                return Err(Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            // Loop on spurious wakeups until the deadline or a cancel
            cancelled = cvar
                .wait_timeout(cancelled, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

/// Computes and performs the wait before each status check
#[derive(Debug, Clone, Default)]
pub struct PollScheduler<C, S> {
    clock: C,
    sleeper: S,
}

impl<C: Clock, S: Sleeper> PollScheduler<C, S> {
    pub fn new(clock: C, sleeper: S) -> Self {
        Self { clock, sleeper }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Time left until `deadline`, zero if it has passed
    pub fn wait_time(&self, deadline: DateTime<Utc>) -> Duration {
        (deadline - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Block until `deadline` has passed
    pub fn wait_until(&self, deadline: DateTime<Utc>) -> Result<(), Interrupted> {
        self.wait_for(self.wait_time(deadline))
    }

    /// Block for `duration`; returns immediately for a zero duration
    pub fn wait_for(&self, duration: Duration) -> Result<(), Interrupted> {
        if duration.is_zero() {
            return Ok(());
        }
        debug!(wait_ms = duration.as_millis() as u64, "Waiting before status check");
        self.sleeper.sleep(duration)
    }
}
