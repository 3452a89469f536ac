//! # DataPub Domain Layer
//!
//! This crate contains the continuation protocol used by the DataPub client
//! for long-running operations. The service may answer a write, import or
//! query either immediately or with a deferral that must be polled:
//!
//! - **Signals**: `DeferralSignal` (by redirect URL or by opaque ticket)
//! - **Engine**: `Continuation`, which polls until a final answer
//! - **Tickets**: `ResumableTicket`, a checkpoint for resuming after failure
//! - **Ports**: `Clock` and `Sleeper`, the engine's only view of time
//!
//! ## Architecture
//!
//! This layer has NO dependency on an HTTP client. Issuing a request is the
//! caller's job, expressed as a closure returning `Outcome<T>`; an adapter
//! crate provides closures backed by a real client.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use chrono::Utc;
//! use datapub_domain::continuation::{
//!     AttemptError, Continuation, ContinuationPolicy, DeferralSignal, Outcome,
//!     RequestDescriptor, ResumableTicket,
//! };
//!
//! let engine = Continuation::new(ContinuationPolicy::default());
//! let ticket = ResumableTicket::new(
//!     DeferralSignal::by_ticket("abc", Utc::now()),
//!     RequestDescriptor::new::<String>("datasets/abcd-1234"),
//!     |_: &DeferralSignal| -> Result<Outcome<String>, AttemptError> {
//!         Ok(Outcome::Completed("done".to_string()))
//!     },
//! );
//!
//! let result = engine.resume(ticket, 3, Duration::from_millis(100)).unwrap();
//! assert_eq!(result, "done");
//! ```

pub mod continuation;
pub mod ports;

// Re-export commonly used types
pub use continuation::{
    AttemptError, Continuation, ContinuationError, ContinuationPolicy, DeferralSignal, Outcome,
    RequestDescriptor, ResumableTicket,
};
pub use ports::{Clock, Sleeper};
