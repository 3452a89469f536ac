//! Continuation engine - drives a request through deferral to its result
//!
//! Per operation the engine moves through
//! `Submitted -> {Completed | Deferred} -> Polling -> {Completed | gave up}`.
//! Everything runs on the calling thread: the only suspension points are the
//! poll waits and the blocking request attempts supplied by the caller.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::retry_after::DEFAULT_RETRY_WAIT;
use super::{
    AttemptError, CancelToken, ContinuationError, DeferralSignal, Outcome, PollScheduler,
    RequestDescriptor, ResumableTicket, SystemClock, ThreadSleeper,
};
use crate::ports::{Clock, Sleeper};

/// Bounds applied while polling a deferred operation
///
/// The two counters are independent: re-deferrals are paced by the service
/// and only limited by `max_poll_attempts`, while `max_local_retries` limits
/// consecutive local failures (network or response processing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationPolicy {
    /// Consecutive local failures tolerated before giving up (default: 3)
    pub max_local_retries: u32,
    /// Total status checks before giving up (default: unbounded)
    pub max_poll_attempts: u32,
    /// Wait between a local failure and the next status check (default: 1s)
    pub retry_interval: Duration,
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self {
            max_local_retries: 3,
            max_poll_attempts: u32::MAX,
            retry_interval: DEFAULT_RETRY_WAIT,
        }
    }
}

/// Blocking engine that hides deferral from callers
///
/// Generic over the [`Clock`] and [`Sleeper`] ports; [`Continuation::new`]
/// uses the wall clock and `std::thread::sleep`.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use datapub_domain::continuation::{
///     Continuation, ContinuationPolicy, DeferralSignal, Outcome, RequestDescriptor,
/// };
///
/// let engine = Continuation::new(ContinuationPolicy::default());
/// let rows: u64 = engine
///     .perform(
///         RequestDescriptor::new::<u64>("datasets/abcd-1234"),
///         || Ok(Outcome::Deferred(DeferralSignal::by_ticket("t-1", Utc::now()))),
///         |_: &DeferralSignal| Ok(Outcome::Completed(42)),
///     )
///     .unwrap();
/// assert_eq!(rows, 42);
/// ```
#[derive(Debug, Clone)]
pub struct Continuation<C = SystemClock, S = ThreadSleeper> {
    scheduler: PollScheduler<C, S>,
    policy: ContinuationPolicy,
}

impl Continuation {
    /// Engine on the wall clock, sleeping the calling thread
    pub fn new(policy: ContinuationPolicy) -> Self {
        Self::with_parts(policy, SystemClock, ThreadSleeper)
    }
}

impl Continuation<SystemClock, CancelToken> {
    /// Engine whose waits can be interrupted through `token`
    pub fn with_cancellation(policy: ContinuationPolicy, token: CancelToken) -> Self {
        Self::with_parts(policy, SystemClock, token)
    }
}

impl<C: Clock, S: Sleeper> Continuation<C, S> {
    pub fn with_parts(policy: ContinuationPolicy, clock: C, sleeper: S) -> Self {
        Self {
            scheduler: PollScheduler::new(clock, sleeper),
            policy,
        }
    }

    pub fn policy(&self) -> &ContinuationPolicy {
        &self.policy
    }

    /// Clock the engine waits on; adapters stamp deadlines with it
    pub fn clock(&self) -> &C {
        self.scheduler.clock()
    }

    /// Submit a request and poll through any deferral until a final answer
    ///
    /// `submit` is invoked exactly once. If it defers, `status_check` is
    /// invoked with the latest signal after each `retry_not_before` has
    /// passed, until it completes or the policy gives up. The result is the
    /// same as for a synchronous answer.
    ///
    /// # Errors
    ///
    /// - `ContinuationError::Attempt` if the submission fails (never retried)
    ///   or a status check returns a service-level error
    /// - `ContinuationError::RetriesExhausted` after more than
    ///   `max_local_retries` consecutive local failures
    /// - `ContinuationError::PollLimitReached` after `max_poll_attempts` checks
    /// - `ContinuationError::Interrupted` if a wait is cancelled
    ///
    /// All but the first carry the `ResumableTicket` to resume from.
    pub fn perform<T, F, P>(
        &self,
        request: RequestDescriptor,
        submit: F,
        status_check: P,
    ) -> Result<T, ContinuationError<T>>
    where
        F: FnOnce() -> Result<Outcome<T>, AttemptError>,
        P: Fn(&DeferralSignal) -> Result<Outcome<T>, AttemptError> + Send + Sync + 'static,
    {
        match submit()? {
            Outcome::Completed(value) => Ok(value),
            Outcome::Deferred(signal) => {
                let ticket = ResumableTicket::new(signal, request, status_check);
                info!(
                    operation_id = %ticket.operation_id(),
                    resource = %ticket.request().resource_id,
                    retry_not_before = %ticket.signal().retry_not_before(),
                    "Request deferred by service, polling for result"
                );
                self.poll(
                    ticket,
                    self.policy.max_local_retries,
                    self.policy.retry_interval,
                )
            }
        }
    }

    /// Resume polling from a ticket after a previously reported failure
    ///
    /// Waits for the ticket's `retry_not_before`, then checks status. Up to
    /// `retries` consecutive local failures are retried, `interval` apart;
    /// one more fails with `RetriesExhausted` carrying the latest ticket.
    pub fn resume<T>(
        &self,
        ticket: ResumableTicket<T>,
        retries: u32,
        interval: Duration,
    ) -> Result<T, ContinuationError<T>> {
        info!(
            operation_id = %ticket.operation_id(),
            resource = %ticket.request().resource_id,
            retries,
            "Resuming deferred operation"
        );
        self.poll(ticket, retries, interval)
    }

    fn poll<T>(
        &self,
        mut ticket: ResumableTicket<T>,
        retries: u32,
        interval: Duration,
    ) -> Result<T, ContinuationError<T>> {
        let mut checks: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            // No wait once the check budget is spent
            if checks >= self.policy.max_poll_attempts {
                error!(
                    operation_id = %ticket.operation_id(),
                    attempts = checks,
                    "Operation still deferred after maximum status checks"
                );
                return Err(ContinuationError::PollLimitReached {
                    attempts: checks,
                    ticket: Box::new(ticket),
                });
            }

            let waited = if failures == 0 {
                self.scheduler.wait_until(ticket.signal().retry_not_before())
            } else {
                self.scheduler.wait_for(interval)
            };
            if waited.is_err() {
                error!(operation_id = %ticket.operation_id(), "Polling interrupted");
                return Err(ContinuationError::Interrupted {
                    ticket: Box::new(ticket),
                });
            }

            checks += 1;

            debug!(operation_id = %ticket.operation_id(), attempt = checks, "Checking status");
            match ticket.check_status() {
                Ok(Outcome::Completed(value)) => {
                    info!(
                        operation_id = %ticket.operation_id(),
                        attempts = checks,
                        "Deferred operation completed"
                    );
                    return Ok(value);
                }
                Ok(Outcome::Deferred(next)) => {
                    debug!(
                        operation_id = %ticket.operation_id(),
                        retry_not_before = %next.retry_not_before(),
                        "Operation deferred again"
                    );
                    failures = 0;
                    ticket.advance(next);
                }
                Err(err) if err.is_local() => {
                    failures += 1;
                    if failures > retries {
                        error!(
                            operation_id = %ticket.operation_id(),
                            failures,
                            error = %err,
                            "Giving up after consecutive local failures"
                        );
                        return Err(ContinuationError::RetriesExhausted {
                            attempts: failures,
                            ticket: Box::new(ticket),
                            source: err,
                        });
                    }
                    warn!(
                        operation_id = %ticket.operation_id(),
                        failures,
                        retries,
                        error = %err,
                        "Status check failed locally, retrying"
                    );
                }
                Err(err) => {
                    error!(
                        operation_id = %ticket.operation_id(),
                        error = %err,
                        "Status check rejected by service"
                    );
                    return Err(ContinuationError::Attempt(err));
                }
            }
        }
    }
}
