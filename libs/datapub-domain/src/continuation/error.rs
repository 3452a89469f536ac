//! Errors raised while submitting and polling long-running operations
//!
//! Deferral is not an error: it is the `Outcome::Deferred` variant. The types
//! here cover failed attempts and the ways polling can give up.

use std::fmt;

use thiserror::Error;

use crate::continuation::ticket::ResumableTicket;

/// Failure of a single request attempt (submission or status check)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Network-level failure: connect, timeout, reset
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The response arrived but could not be understood
    #[error("Failed to process response: {0}")]
    Processing(String),

    /// The service answered with a definitive error status
    #[error("Service returned status {status}: {message}")]
    Service { status: u16, message: String },
}

impl AttemptError {
    /// Create a transport error with a message
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a processing error with a message
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a service error
    pub fn service(status: u16, msg: impl Into<String>) -> Self {
        Self::Service {
            status,
            message: msg.into(),
        }
    }

    /// Local errors are transient and may be retried while polling
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Processing(_))
    }
}

/// A poll wait was cancelled before it elapsed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Wait interrupted")]
pub struct Interrupted;

/// Errors returned by the continuation engine
///
/// Every variant raised after a deferral was observed carries the
/// `ResumableTicket`, so submitted-but-unconfirmed work can be resumed with
/// `Continuation::resume` instead of being resubmitted.
#[derive(Error)]
pub enum ContinuationError<T> {
    /// The submission failed, or a status check hit a service-level error
    #[error(transparent)]
    Attempt(AttemptError),

    /// Too many consecutive local failures while checking status
    #[error("Gave up after {attempts} consecutive local failures: {source}")]
    RetriesExhausted {
        attempts: u32,
        ticket: Box<ResumableTicket<T>>,
        #[source]
        source: AttemptError,
    },

    /// The operation was still deferred after the maximum number of checks
    #[error("Operation still pending after {attempts} status checks")]
    PollLimitReached {
        attempts: u32,
        ticket: Box<ResumableTicket<T>>,
    },

    /// The wait before a status check was cancelled
    #[error("Interrupted while waiting to check status")]
    Interrupted { ticket: Box<ResumableTicket<T>> },
}

impl<T> ContinuationError<T> {
    /// The checkpoint to resume from, if a deferral had been observed
    pub fn ticket(&self) -> Option<&ResumableTicket<T>> {
        match self {
            Self::Attempt(_) => None,
            Self::RetriesExhausted { ticket, .. }
            | Self::PollLimitReached { ticket, .. }
            | Self::Interrupted { ticket } => Some(ticket),
        }
    }

    /// Take ownership of the attached checkpoint
    pub fn into_ticket(self) -> Option<ResumableTicket<T>> {
        match self {
            Self::Attempt(_) => None,
            Self::RetriesExhausted { ticket, .. }
            | Self::PollLimitReached { ticket, .. }
            | Self::Interrupted { ticket } => Some(*ticket),
        }
    }
}

impl<T> From<AttemptError> for ContinuationError<T> {
    fn from(err: AttemptError) -> Self {
        Self::Attempt(err)
    }
}

impl<T> fmt::Debug for ContinuationError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attempt(err) => f.debug_tuple("Attempt").field(err).finish(),
            Self::RetriesExhausted {
                attempts,
                ticket,
                source,
            } => f
                .debug_struct("RetriesExhausted")
                .field("attempts", attempts)
                .field("ticket", ticket)
                .field("source", source)
                .finish(),
            Self::PollLimitReached { attempts, ticket } => f
                .debug_struct("PollLimitReached")
                .field("attempts", attempts)
                .field("ticket", ticket)
                .finish(),
            Self::Interrupted { ticket } => {
                f.debug_struct("Interrupted").field("ticket", ticket).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_errors() {
        assert!(AttemptError::transport("connection reset").is_local());
        assert!(AttemptError::processing("truncated body").is_local());
        assert!(!AttemptError::service(404, "no such dataset").is_local());
    }

    #[test]
    fn test_service_error_message() {
        let err = AttemptError::service(409, "dataset is locked");
        assert_eq!(err.to_string(), "Service returned status 409: dataset is locked");
    }

    #[test]
    fn test_attempt_error_is_transparent() {
        let err: ContinuationError<()> = AttemptError::transport("timed out").into();
        assert_eq!(err.to_string(), "Transport failure: timed out");
        assert!(err.ticket().is_none());
    }
}
