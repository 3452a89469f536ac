//! # DataPub HTTP
//!
//! Blocking HTTP adapter that runs dataset writes, imports and queries through
//! the continuation engine of `datapub-domain`.
//!
//! ## Architecture
//!
//! - **deferral**: maps raw responses to `Outcome`s (`202` + `Location`,
//!   `202` + ticket body, `2xx` result, error status)
//! - **reqwest_client**: [`HttpIssuer`], which submits once and then polls
//!   status routes until the operation completes
//!
//! ## Example
//!
//! ```rust,no_run
//! use datapub_domain::continuation::{Continuation, ContinuationPolicy};
//! use datapub_http::{HttpIssuer, Payload};
//! use reqwest::{Method, Url};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let issuer = HttpIssuer::new()?;
//! let engine = Continuation::new(ContinuationPolicy::default());
//!
//! let url = Url::parse("https://data.example/api/datasets/abcd-1234")?;
//! let payload = Payload::gzip_file("rows.csv", "text/csv")?;
//! let result: serde_json::Value = issuer
//!     .perform(&engine, Method::POST, url, "abcd-1234", Some(payload))
//!     .map_err(|e| e.to_string())?;
//! println!("{}", result);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod infrastructure;

pub use error::{HttpError, Result};
pub use infrastructure::{classify, HttpIssuer, Payload, RawResponse, StatusRoute};
