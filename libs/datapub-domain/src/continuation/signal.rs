//! Deferral signals and attempt outcomes
//!
//! When the service cannot answer a write, import or query synchronously it
//! replies with a "come back later" signal instead of the result. The signal
//! says where to ask again and not before when; it never carries payload.

use std::any::type_name;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Routing information for polling a deferred operation
///
/// Exactly one addressing scheme is present. Immutable once constructed;
/// a later poll that defers again produces a new signal.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use datapub_domain::continuation::DeferralSignal;
///
/// let signal = DeferralSignal::by_ticket("a1b2c3", Utc::now());
/// assert_eq!(signal.ticket(), Some("a1b2c3"));
/// assert!(signal.location().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeferralSignal {
    /// Poll by re-fetching a redirect URL
    ByLocation {
        url: String,
        retry_not_before: DateTime<Utc>,
    },

    /// Poll by re-issuing the original request shape with an opaque ticket
    ByTicket {
        ticket: String,
        retry_not_before: DateTime<Utc>,
    },
}

impl DeferralSignal {
    pub fn by_location(url: impl Into<String>, retry_not_before: DateTime<Utc>) -> Self {
        Self::ByLocation {
            url: url.into(),
            retry_not_before,
        }
    }

    pub fn by_ticket(ticket: impl Into<String>, retry_not_before: DateTime<Utc>) -> Self {
        Self::ByTicket {
            ticket: ticket.into(),
            retry_not_before,
        }
    }

    /// Earliest instant at which the next status check may be issued
    pub fn retry_not_before(&self) -> DateTime<Utc> {
        match self {
            Self::ByLocation {
                retry_not_before, ..
            }
            | Self::ByTicket {
                retry_not_before, ..
            } => *retry_not_before,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Self::ByLocation { url, .. } => Some(url),
            Self::ByTicket { .. } => None,
        }
    }

    pub fn ticket(&self) -> Option<&str> {
        match self {
            Self::ByTicket { ticket, .. } => Some(ticket),
            Self::ByLocation { .. } => None,
        }
    }
}

/// Result of one request attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The service answered with the final result
    Completed(T),
    /// The service deferred; poll according to the signal
    Deferred(DeferralSignal),
}

/// Description of the request a deferral belongs to
///
/// Kept on the ticket for diagnostics and for callers that persist tickets.
/// The payload itself is never held; only a caller-chosen reference to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Target resource (e.g. dataset id or endpoint path)
    pub resource_id: String,

    /// Reference to the submitted payload (e.g. a file path), if any
    pub payload: Option<String>,

    /// Name of the type the final result deserializes into
    pub result_type: String,
}

impl RequestDescriptor {
    /// Describe a request whose final result is a `T`
    pub fn new<T>(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            payload: None,
            result_type: type_name::<T>().to_string(),
        }
    }

    /// Attach a payload reference
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}
