//! Ports (trait definitions) for the engine's time dependencies
//!
//! The continuation engine never reads the wall clock or sleeps directly.
//! Both go through these ports so that callers can substitute their own
//! scheduling and tests can run without real waiting.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::continuation::error::Interrupted;

/// Port for reading the current time
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Port for suspending the calling thread between status checks
///
/// Implementations block for at least `duration` unless interrupted.
/// Interruption is fatal to the operation being polled and is never retried.
#[cfg_attr(test, mockall::automock)]
pub trait Sleeper: Send + Sync {
    /// Block the calling thread
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the wait was cancelled before it elapsed.
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;
}
