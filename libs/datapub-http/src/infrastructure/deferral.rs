//! Deferral detection on raw HTTP responses
//!
//! Maps one response to an [`Outcome`]:
//!
//! - `202 Accepted` with a usable `Location` header: `ByLocation`
//! - `202 Accepted` without one, body `{"ticket": "..."}`: `ByTicket`
//! - other `2xx`: the body decoded as JSON
//! - anything else: a service-level error
//!
//! `Retry-After` sets the signal's `retry_not_before` in both deferral cases.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use datapub_domain::continuation::{retry_not_before, AttemptError, DeferralSignal, Outcome};
use reqwest::{
    header::{HeaderMap, LOCATION, RETRY_AFTER},
    StatusCode, Url,
};
use serde::{de::DeserializeOwned, Deserialize};

/// Query parameter carrying the ticket on a `ByTicket` status check
pub const TICKET_PARAM: &str = "ticket";

/// Fully read HTTP response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Deserialize)]
struct TicketBody {
    ticket: Option<String>,
}

/// Classify a response to a request sent to `request_url`
///
/// # Errors
///
/// - `AttemptError::Service` for non-2xx statuses
/// - `AttemptError::Processing` for a 202 that cannot be addressed, or a
///   body that does not decode into `T`
pub fn classify<T: DeserializeOwned>(
    response: &RawResponse,
    request_url: &Url,
    now: DateTime<Utc>,
) -> Result<Outcome<T>, AttemptError> {
    if response.status == StatusCode::ACCEPTED {
        return detect_deferral(response, request_url, now).map(Outcome::Deferred);
    }

    if response.status.is_success() {
        return decode(&response.body).map(Outcome::Completed);
    }

    Err(AttemptError::service(
        response.status.as_u16(),
        error_message(response),
    ))
}

/// Build the deferral signal for a `202 Accepted` response
pub fn detect_deferral(
    response: &RawResponse,
    request_url: &Url,
    now: DateTime<Utc>,
) -> Result<DeferralSignal, AttemptError> {
    let header = response
        .headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok());
    let retry_at = retry_not_before(header, now);

    if let Some(url) = location(&response.headers, request_url) {
        return Ok(DeferralSignal::by_location(url, retry_at));
    }

    match serde_json::from_slice::<TicketBody>(&response.body) {
        Ok(TicketBody {
            ticket: Some(ticket),
        }) if !ticket.is_empty() => Ok(DeferralSignal::by_ticket(ticket, retry_at)),
        _ => Err(AttemptError::processing(
            "202 Accepted without a usable Location header or ticket",
        )),
    }
}

/// Absolute URL from the `Location` header, resolved against the request
fn location(headers: &HeaderMap, request_url: &Url) -> Option<String> {
    let raw = headers.get(LOCATION)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    request_url.join(raw).ok().map(String::from)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, AttemptError> {
    // An empty body decodes like JSON `null`, so `()` and `Option<_>` work
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|e| AttemptError::processing(format!("Failed to decode response body: {}", e)))
}

fn error_message(response: &RawResponse) -> String {
    let text = String::from_utf8_lossy(&response.body).trim().to_string();
    if text.is_empty() {
        response
            .status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        text
    }
}
