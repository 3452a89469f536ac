//! HTTP adapter for the continuation engine
//!
//! Issues the submission and the status checks of a long-running operation
//! with a blocking `reqwest` client. Every response goes through
//! [`classify`](super::deferral::classify), so callers see the same
//! [`Outcome`] whichever addressing scheme the service chose.
//!
//! ## Status routes
//!
//! A `ByLocation` signal is polled with a plain `GET` on its URL. A
//! `ByTicket` signal re-issues the original method and URL with a
//! `?ticket=` query parameter and no body; the [`StatusRoute`] records that
//! method and URL so a ticket can be rebuilt in another process.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use datapub_domain::continuation::{
    AttemptError, Continuation, ContinuationError, DeferralSignal, Outcome, RequestDescriptor,
    ResumableTicket,
};
use datapub_domain::ports::{Clock, Sleeper};
use datapub_pipe::{Compression, LazyTransformStream, LoadNext, DEFAULT_CHUNK_SIZE};
use reqwest::{
    blocking::{Body, Client, RequestBuilder},
    header::{CONTENT_ENCODING, CONTENT_TYPE},
    Method, Url,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::deferral::{classify, RawResponse, TICKET_PARAM};
use crate::error::{HttpError, Result};

/// Default end-to-end timeout of a status check
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for establishing a connection, submissions included
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("datapub/", env!("CARGO_PKG_VERSION"));

/// Method and URL of the original request
///
/// Needed to poll `ByTicket` deferrals, which re-issue the original request
/// shape. Serializable alongside a [`DeferralSignal`] for cross-process resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRoute {
    pub method: String,
    pub url: String,
}

impl StatusRoute {
    pub fn new(method: &Method, url: &Url) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
        }
    }
}

/// Request body for a submission
pub struct Payload {
    body: Body,
    content_type: String,
    content_encoding: Option<&'static str>,
    reference: Option<String>,
}

impl Payload {
    /// In-memory body sent with a known length
    pub fn bytes(data: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            body: Body::from(data.into()),
            content_type: content_type.into(),
            content_encoding: None,
            reference: None,
        }
    }

    /// Body pulled lazily from a transform stream, sent chunked
    ///
    /// The stream is only read while the client writes the request, so at
    /// most one pipe's worth of transformed bytes is held in memory.
    pub fn stream<L>(stream: LazyTransformStream<L>, content_type: impl Into<String>) -> Self
    where
        L: LoadNext + Send + 'static,
    {
        Self {
            body: Body::new(stream),
            content_type: content_type.into(),
            content_encoding: None,
            reference: None,
        }
    }

    /// Stream a file as-is
    pub fn file(path: impl AsRef<Path>, content_type: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let source = open(path)?;
        Ok(Self::stream(
            LazyTransformStream::identity(source, DEFAULT_CHUNK_SIZE),
            content_type,
        )
        .with_reference(path.display().to_string()))
    }

    /// Stream a file gzip-compressed on the fly, with `Content-Encoding: gzip`
    pub fn gzip_file(path: impl AsRef<Path>, content_type: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let source = open(path)?;
        let mut payload = Self::stream(
            LazyTransformStream::gzip(source, DEFAULT_CHUNK_SIZE, Compression::default()),
            content_type,
        )
        .with_reference(path.display().to_string());
        payload.content_encoding = Some("gzip");
        Ok(payload)
    }

    /// Mark the body as already gzip-encoded
    pub fn gzipped(mut self) -> Self {
        self.content_encoding = Some("gzip");
        self
    }

    /// Attach a reference recorded on the request descriptor (e.g. a path)
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    fn apply(self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header(CONTENT_TYPE, self.content_type)
            .body(self.body);
        match self.content_encoding {
            Some(encoding) => request.header(CONTENT_ENCODING, encoding),
            None => request,
        }
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| HttpError::payload(path, source))
}

/// Blocking HTTP client speaking the deferral protocol
///
/// Submissions have no total deadline, only [`DEFAULT_CONNECT_TIMEOUT`]:
/// streaming a large computed body may take arbitrarily long and a failed
/// submission is never retried. Status checks carry no body and are bounded
/// end to end by the status timeout.
///
/// Cheap to clone; clones share the connection pool. Must not be used from
/// inside an async context: host it on `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct HttpIssuer {
    client: Client,
    status_timeout: Duration,
}

impl HttpIssuer {
    /// Create an issuer with a [`DEFAULT_REQUEST_TIMEOUT`] status timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create an issuer whose status checks time out after `status_timeout`
    pub fn with_timeout(status_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(HttpError::ClientBuild)?;
        info!(
            status_timeout_ms = status_timeout.as_millis() as u64,
            connect_timeout_ms = DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            "Initialized HTTP issuer"
        );
        Ok(Self {
            client,
            status_timeout,
        })
    }

    /// Send the original request once
    ///
    /// `clock` stamps the `retry_not_before` of a deferral.
    #[instrument(skip_all, fields(method = %method, url = %url))]
    pub fn submit<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &Url,
        payload: Option<Payload>,
        clock: &dyn Clock,
    ) -> std::result::Result<Outcome<T>, AttemptError> {
        let request = self.client.request(method, url.clone());
        let request = match payload {
            Some(payload) => payload.apply(request),
            None => request,
        };
        self.execute(request, clock)
    }

    /// Issue one status check addressed by `signal`
    ///
    /// `route` is only consulted for `ByTicket` signals.
    #[instrument(skip_all, fields(route = %route.url))]
    pub fn check_status<T: DeserializeOwned>(
        &self,
        route: &StatusRoute,
        signal: &DeferralSignal,
        clock: &dyn Clock,
    ) -> std::result::Result<Outcome<T>, AttemptError> {
        let request = match signal {
            DeferralSignal::ByLocation { url, .. } => {
                let url = parse_url(url)?;
                debug!(location = %url, "Polling status location");
                self.client.get(url)
            }
            DeferralSignal::ByTicket { ticket, .. } => {
                let method = Method::from_bytes(route.method.as_bytes()).map_err(|e| {
                    AttemptError::processing(format!("Invalid method '{}': {}", route.method, e))
                })?;
                let mut url = parse_url(&route.url)?;
                url.query_pairs_mut().append_pair(TICKET_PARAM, ticket);
                debug!(method = %method, url = %url, "Polling with ticket");
                self.client.request(method, url)
            }
        };
        self.execute(request.timeout(self.status_timeout), clock)
    }

    /// Rebuild a ticket from a persisted signal, request and route
    ///
    /// Pass the clock of the engine that will resume the ticket.
    pub fn ticket_for<T, C>(
        &self,
        route: StatusRoute,
        signal: DeferralSignal,
        request: RequestDescriptor,
        clock: C,
    ) -> ResumableTicket<T>
    where
        T: DeserializeOwned + 'static,
        C: Clock + Clone + 'static,
    {
        ResumableTicket::new(signal, request, self.status_check(route, clock))
    }

    /// Submit `payload` to `url` and wait through any deferral
    ///
    /// Returns the same result a synchronous `2xx` answer would have carried.
    /// The payload is sent exactly once; polling never resubmits it.
    /// Deadlines are stamped with the engine's clock.
    ///
    /// # Errors
    ///
    /// See [`Continuation::perform`]. Escalated errors carry a ticket that
    /// [`Continuation::resume`] accepts.
    pub fn perform<T, C, S>(
        &self,
        engine: &Continuation<C, S>,
        method: Method,
        url: Url,
        resource_id: impl Into<String>,
        payload: Option<Payload>,
    ) -> std::result::Result<T, ContinuationError<T>>
    where
        T: DeserializeOwned + 'static,
        C: Clock + Clone + 'static,
        S: Sleeper,
    {
        let mut request = RequestDescriptor::new::<T>(resource_id);
        if let Some(reference) = payload.as_ref().and_then(Payload::reference) {
            request = request.with_payload(reference);
        }

        let route = StatusRoute::new(&method, &url);
        let clock = engine.clock();
        engine.perform(
            request,
            || self.submit(method, &url, payload, clock),
            self.status_check(route, clock.clone()),
        )
    }

    fn status_check<T, C>(
        &self,
        route: StatusRoute,
        clock: C,
    ) -> impl Fn(&DeferralSignal) -> std::result::Result<Outcome<T>, AttemptError> + Send + Sync + 'static
    where
        T: DeserializeOwned + 'static,
        C: Clock + Clone + 'static,
    {
        let issuer = self.clone();
        move |signal: &DeferralSignal| issuer.check_status(&route, signal, &clock)
    }

    fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        clock: &dyn Clock,
    ) -> std::result::Result<Outcome<T>, AttemptError> {
        let response = request.send().map_err(|e| {
            warn!(error = %e, "Request failed");
            AttemptError::transport(e.to_string())
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().map_err(|e| {
            warn!(status = status.as_u16(), error = %e, "Failed to read response body");
            AttemptError::processing(format!("Failed to read response body: {}", e))
        })?;

        debug!(status = status.as_u16(), body_size = body.len(), "Received response");
        classify(
            &RawResponse {
                status,
                headers,
                body,
            },
            &url,
            clock.now(),
        )
    }
}

fn parse_url(raw: &str) -> std::result::Result<Url, AttemptError> {
    Url::parse(raw).map_err(|e| AttemptError::processing(format!("Invalid URL '{}': {}", raw, e)))
}
