//! Continuation domain module
//!
//! Long-running operations on the publishing service may be answered
//! immediately or deferred. This module contains the signals describing a
//! deferral, the engine that polls through it, and the tickets that let a
//! caller resume polling after a local failure.

mod engine;
pub mod error;
mod ids;
mod retry_after;
mod scheduler;
mod signal;
mod ticket;

pub use engine::{Continuation, ContinuationPolicy};
pub use error::{AttemptError, ContinuationError, Interrupted};
pub use ids::OperationId;
pub use retry_after::{parse_retry_after, retry_not_before, DEFAULT_RETRY_WAIT};
pub use scheduler::{CancelToken, PollScheduler, SystemClock, ThreadSleeper};
pub use signal::{DeferralSignal, Outcome, RequestDescriptor};
pub use ticket::{ResumableTicket, StatusCheck};
