//! `Retry-After` header parsing
//!
//! The header carries either a number of seconds or an HTTP-date
//! (`Sun, 06 Nov 1994 08:49:37 GMT`, always UTC). Parsing tries the integer
//! form, then the date form, then falls back to [`DEFAULT_RETRY_WAIT`].

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Wait applied when the header is missing or unparseable
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(1000);

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Absolute instant before which the deferred operation must not be polled
pub fn retry_not_before(header: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    header
        .map(str::trim)
        .and_then(|value| parse_seconds(value, now).or_else(|| parse_http_date(value)))
        .unwrap_or_else(|| now + to_chrono(DEFAULT_RETRY_WAIT))
}

/// Parse a `Retry-After` value, falling back to `now + DEFAULT_RETRY_WAIT`
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    retry_not_before(Some(value), now)
}

fn parse_seconds(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let seconds: u32 = value.parse().ok()?;
    now.checked_add_signed(chrono::Duration::seconds(i64::from(seconds)))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, HTTP_DATE_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}
