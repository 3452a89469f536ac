//! Resumable checkpoints for deferred operations

use std::fmt;
use std::sync::Arc;

use crate::continuation::{
    error::AttemptError,
    ids::OperationId,
    signal::{DeferralSignal, Outcome, RequestDescriptor},
};

/// Re-issues a status check addressed by the given signal
///
/// Never resubmits the original mutating request.
pub type StatusCheck<T> =
    dyn Fn(&DeferralSignal) -> Result<Outcome<T>, AttemptError> + Send + Sync;

/// Checkpoint that lets polling resume after a local failure
///
/// Created as soon as a deferral is observed and updated with every newer
/// signal. It holds routing information and a status-check closure, never the
/// payload, so resuming can never resubmit non-idempotent work.
///
/// Not persisted by the engine. Callers that want to resume across process
/// restarts can serialize [`signal`](Self::signal) and
/// [`request`](Self::request) and rebuild a ticket with [`new`](Self::new).
pub struct ResumableTicket<T> {
    operation_id: OperationId,
    signal: DeferralSignal,
    request: RequestDescriptor,
    status_check: Arc<StatusCheck<T>>,
}

impl<T> ResumableTicket<T> {
    /// Create a ticket for a freshly observed deferral
    pub fn new<F>(signal: DeferralSignal, request: RequestDescriptor, status_check: F) -> Self
    where
        F: Fn(&DeferralSignal) -> Result<Outcome<T>, AttemptError> + Send + Sync + 'static,
    {
        Self {
            operation_id: OperationId::new(),
            signal,
            request,
            status_check: Arc::new(status_check),
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Last known deferral signal
    pub fn signal(&self) -> &DeferralSignal {
        &self.signal
    }

    /// The request this ticket was created for
    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    /// Issue one status check addressed by the current signal
    pub fn check_status(&self) -> Result<Outcome<T>, AttemptError> {
        (self.status_check)(&self.signal)
    }

    /// Record a newer deferral returned by a status check
    pub(crate) fn advance(&mut self, signal: DeferralSignal) {
        self.signal = signal;
    }
}

impl<T> Clone for ResumableTicket<T> {
    fn clone(&self) -> Self {
        Self {
            operation_id: self.operation_id,
            signal: self.signal.clone(),
            request: self.request.clone(),
            status_check: Arc::clone(&self.status_check),
        }
    }
}

impl<T> fmt::Debug for ResumableTicket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumableTicket")
            .field("operation_id", &self.operation_id)
            .field("signal", &self.signal)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}
