//! Errors raised while setting up HTTP requests
//!
//! Failures of individual request attempts are reported as
//! `datapub_domain::continuation::AttemptError`; the types here only cover
//! building the client and opening payloads.

use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    /// The underlying `reqwest` client could not be built
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// A payload file could not be opened
    #[error("Failed to open payload '{path}': {source}")]
    Payload {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl HttpError {
    /// Create a payload error for `path`
    pub fn payload(path: &Path, source: io::Error) -> Self {
        Self::Payload {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_error_names_path() {
        let err = HttpError::payload(
            Path::new("/data/rows.csv"),
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );

        let msg = err.to_string();
        assert!(msg.contains("/data/rows.csv"));
        assert!(msg.contains("no such file"));
    }
}
