//! Environment configuration for the upload tool

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use datapub_domain::continuation::ContinuationPolicy;
use datapub_http::infrastructure::DEFAULT_REQUEST_TIMEOUT;
use reqwest::{Method, Url};

const DEFAULT_TICKET_FILE: &str = "datapub-ticket.json";
const DEFAULT_CONTENT_TYPE: &str = "text/csv";

#[derive(Debug, Clone)]
pub struct Config {
    /// Target URL of the write; required unless resuming
    pub endpoint: Option<Url>,
    pub payload: Option<PathBuf>,
    pub method: Method,
    pub resource_id: String,
    pub content_type: String,
    pub gzip: bool,
    pub policy: ContinuationPolicy,
    /// End-to-end timeout of each status check; uploads are not bounded by it
    pub request_timeout: Duration,
    pub ticket_file: PathBuf,
    pub resume: bool,
    pub log_json: bool,
}

impl Config {
    /// Read the `DATAPUB_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let resume = flag(&var, "DATAPUB_RESUME")?;

        let endpoint = var("DATAPUB_ENDPOINT")
            .map(|raw| Url::parse(&raw).with_context(|| format!("Invalid DATAPUB_ENDPOINT '{}'", raw)))
            .transpose()?;
        if endpoint.is_none() && !resume {
            bail!("DATAPUB_ENDPOINT must be set unless DATAPUB_RESUME is enabled");
        }

        let method = match var("DATAPUB_METHOD").as_deref().map(str::to_ascii_uppercase).as_deref() {
            None | Some("POST") => Method::POST,
            Some("PUT") => Method::PUT,
            Some(other) => bail!("Unsupported DATAPUB_METHOD '{}', expected POST or PUT", other),
        };

        let resource_id = var("DATAPUB_RESOURCE_ID")
            .or_else(|| endpoint.as_ref().and_then(last_segment))
            .unwrap_or_else(|| "dataset".to_string());

        let defaults = ContinuationPolicy::default();
        let policy = ContinuationPolicy {
            max_local_retries: number(&var, "DATAPUB_MAX_RETRIES")?
                .unwrap_or(defaults.max_local_retries),
            max_poll_attempts: number(&var, "DATAPUB_MAX_POLLS")?
                .unwrap_or(defaults.max_poll_attempts),
            retry_interval: number::<u64>(&var, "DATAPUB_RETRY_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_interval),
        };

        let request_timeout = number::<u64>(&var, "DATAPUB_REQUEST_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        Ok(Self {
            endpoint,
            payload: var("DATAPUB_PAYLOAD").map(PathBuf::from),
            method,
            resource_id,
            content_type: var("DATAPUB_CONTENT_TYPE")
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            gzip: flag(&var, "DATAPUB_GZIP")?,
            policy,
            request_timeout,
            ticket_file: var("DATAPUB_TICKET_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TICKET_FILE)),
            resume,
            log_json: flag(&var, "DATAPUB_LOG_JSON")?,
        })
    }
}

fn flag(var: impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match var(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => bail!("Invalid boolean for {}: '{}'", key, other),
    }
}

fn number<N>(var: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<N>>
where
    N: std::str::FromStr,
    N::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|raw| {
            raw.parse::<N>()
                .with_context(|| format!("Invalid number for {}: '{}'", key, raw))
        })
        .transpose()
}

fn last_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
