//! Infrastructure layer - `reqwest` implementation of the deferral protocol

pub mod deferral;
pub mod reqwest_client;

pub use deferral::{classify, detect_deferral, RawResponse, TICKET_PARAM};
pub use reqwest_client::{
    HttpIssuer, Payload, StatusRoute, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
