//! End-to-end deferral flows against a scripted local HTTP service

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use datapub_domain::continuation::{
    AttemptError, Continuation, ContinuationError, ContinuationPolicy, Interrupted,
};
use datapub_domain::{Clock, Sleeper};
use datapub_http::{HttpIssuer, Payload};
use datapub_pipe::{Compression, LazyTransformStream, PipeWriter};
use flate2::read::GzDecoder;
use reqwest::{Method, Url};
use serde::Deserialize;

#[derive(Debug, PartialEq, Deserialize)]
struct UpsertResult {
    rows_created: u64,
}

#[derive(Debug, Clone)]
struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Serves one scripted response per connection, in order
struct FakeService {
    base: String,
    captured: Arc<Mutex<Vec<Captured>>>,
    handle: JoinHandle<()>,
}

impl FakeService {
    fn start(responses: Vec<String>) -> Self {
        Self::start_delayed(
            responses
                .into_iter()
                .map(|response| (response, Duration::ZERO))
                .collect(),
        )
    }

    /// Like `start`, holding each response back for its delay
    fn start_delayed(responses: Vec<(String, Duration)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let captured = Arc::new(Mutex::new(Vec::new()));
        let log = captured.clone();

        let handle = thread::spawn(move || {
            for (response, delay) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let request = read_request(&mut stream);
                log.lock().unwrap().push(request);
                thread::sleep(delay);
                // The client may have given up and closed the connection
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self {
            base,
            captured,
            handle,
        }
    }

    fn url(&self, path: &str) -> Url {
        Url::parse(&format!("{}{}", self.base, path)).unwrap()
    }

    fn finish(self) -> Vec<Captured> {
        self.handle.join().unwrap();
        let captured = self.captured.lock().unwrap();
        captured.clone()
    }
}

fn respond(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    response
}

fn read_request(stream: &mut TcpStream) -> Captured {
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let mut captured = Captured {
        request_line: request_line.trim_end().to_string(),
        headers,
        body: Vec::new(),
    };

    if let Some(len) = captured.header("content-length") {
        let mut body = vec![0u8; len.parse().unwrap()];
        reader.read_exact(&mut body).unwrap();
        captured.body = body;
    } else if captured
        .header("transfer-encoding")
        .is_some_and(|v| v.contains("chunked"))
    {
        captured.body = read_chunked(&mut reader);
    }

    captured
}

fn read_chunked(reader: &mut impl BufRead) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).unwrap();
        let size_hex = size_line.trim().split(';').next().unwrap();
        let size = usize::from_str_radix(size_hex, 16).unwrap();

        if size == 0 {
            // Trailers end with an empty line
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line.trim_end().is_empty() {
                    break;
                }
            }
            return body;
        }

        let mut chunk = vec![0u8; size];
        reader.read_exact(&mut chunk).unwrap();
        body.extend_from_slice(&chunk);

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).unwrap();
    }
}

fn engine(max_local_retries: u32) -> Continuation {
    Continuation::new(ContinuationPolicy {
        max_local_retries,
        max_poll_attempts: 10,
        retry_interval: Duration::from_millis(10),
    })
}

#[test]
fn test_location_deferral_returns_polled_result() {
    let service = FakeService::start(vec![
        respond(
            "202 Accepted",
            &[("Location", "/status/17"), ("Retry-After", "0")],
            "",
        ),
        respond(
            "200 OK",
            &[("Content-Type", "application/json")],
            r#"{"rows_created": 2}"#,
        ),
    ]);

    let issuer = HttpIssuer::new().unwrap();
    let payload = Payload::bytes(b"id,name\n1,a\n2,b\n".to_vec(), "text/csv");
    let result: UpsertResult = issuer
        .perform(
            &engine(3),
            Method::POST,
            service.url("/datasets/abcd-1234"),
            "abcd-1234",
            Some(payload),
        )
        .unwrap();

    assert_eq!(result, UpsertResult { rows_created: 2 });

    let requests = service.finish();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].request_line, "POST /datasets/abcd-1234 HTTP/1.1");
    assert_eq!(requests[0].body, b"id,name\n1,a\n2,b\n");
    assert_eq!(requests[1].request_line, "GET /status/17 HTTP/1.1");
    assert!(requests[1].body.is_empty());
}

#[test]
fn test_ticket_deferral_reissues_request_without_payload() {
    let service = FakeService::start(vec![
        respond(
            "202 Accepted",
            &[("Content-Type", "application/json"), ("Retry-After", "0")],
            r#"{"ticket": "t-77"}"#,
        ),
        respond(
            "202 Accepted",
            &[("Content-Type", "application/json"), ("Retry-After", "0")],
            r#"{"ticket": "t-78"}"#,
        ),
        respond(
            "200 OK",
            &[("Content-Type", "application/json")],
            r#"{"rows_created": 500}"#,
        ),
    ]);

    let mut csv = b"id,value\n".to_vec();
    for i in 0..500 {
        csv.extend_from_slice(format!("{},{}\n", i, i * 7).as_bytes());
    }
    let stream = LazyTransformStream::gzip(
        std::io::Cursor::new(csv.clone()),
        256,
        Compression::fast(),
    );
    let payload = Payload::stream(stream, "text/csv").gzipped();

    let issuer = HttpIssuer::new().unwrap();
    let result: UpsertResult = issuer
        .perform(
            &engine(3),
            Method::PUT,
            service.url("/datasets/abcd-1234"),
            "abcd-1234",
            Some(payload),
        )
        .unwrap();

    assert_eq!(result, UpsertResult { rows_created: 500 });

    let requests = service.finish();
    assert_eq!(requests.len(), 3);

    let upload = &requests[0];
    assert_eq!(upload.request_line, "PUT /datasets/abcd-1234 HTTP/1.1");
    assert_eq!(upload.header("content-encoding"), Some("gzip"));
    let mut decoded = Vec::new();
    GzDecoder::new(upload.body.as_slice())
        .read_to_end(&mut decoded)
        .unwrap();
    assert_eq!(decoded, csv);

    assert_eq!(
        requests[1].request_line,
        "PUT /datasets/abcd-1234?ticket=t-77 HTTP/1.1"
    );
    assert!(requests[1].body.is_empty());
    assert_eq!(
        requests[2].request_line,
        "PUT /datasets/abcd-1234?ticket=t-78 HTTP/1.1"
    );
}

#[test]
fn test_synchronous_answer_skips_polling() {
    let service = FakeService::start(vec![respond(
        "201 Created",
        &[("Content-Type", "application/json")],
        r#"{"rows_created": 1}"#,
    )]);

    let issuer = HttpIssuer::new().unwrap();
    let result: UpsertResult = issuer
        .perform(
            &engine(3),
            Method::POST,
            service.url("/datasets/abcd-1234"),
            "abcd-1234",
            Some(Payload::bytes(b"id\n1\n".to_vec(), "text/csv")),
        )
        .unwrap();

    assert_eq!(result, UpsertResult { rows_created: 1 });
    assert_eq!(service.finish().len(), 1);
}

#[test]
fn test_service_error_during_polling_is_not_retried() {
    let service = FakeService::start(vec![
        respond("202 Accepted", &[("Location", "/status/3"), ("Retry-After", "0")], ""),
        respond("422 Unprocessable Entity", &[], "column 'x' does not exist"),
    ]);

    let issuer = HttpIssuer::new().unwrap();
    let err: ContinuationError<UpsertResult> = issuer
        .perform(
            &engine(3),
            Method::POST,
            service.url("/datasets/abcd-1234"),
            "abcd-1234",
            None,
        )
        .unwrap_err();

    match err {
        ContinuationError::Attempt(AttemptError::Service { status, message }) => {
            assert_eq!(status, 422);
            assert_eq!(message, "column 'x' does not exist");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(service.finish().len(), 2);
}

#[test]
fn test_unreachable_status_location_exhausts_retries_with_ticket() {
    // Bind then drop to get a port nothing listens on
    let dead = TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_url = format!("http://{}/status/9", dead.local_addr().unwrap());
    drop(dead);

    let service = FakeService::start(vec![respond(
        "202 Accepted",
        &[("Location", dead_url.as_str()), ("Retry-After", "0")],
        "",
    )]);

    let issuer = HttpIssuer::new().unwrap();
    let err: ContinuationError<UpsertResult> = issuer
        .perform(
            &engine(1),
            Method::POST,
            service.url("/datasets/abcd-1234"),
            "abcd-1234",
            Some(Payload::bytes(b"id\n1\n".to_vec(), "text/csv")),
        )
        .unwrap_err();

    match err {
        ContinuationError::RetriesExhausted {
            attempts,
            ticket,
            source,
        } => {
            assert_eq!(attempts, 2);
            assert!(matches!(source, AttemptError::Transport(_)));
            assert_eq!(ticket.signal().location(), Some(dead_url.as_str()));
            assert_eq!(ticket.request().resource_id, "abcd-1234");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(service.finish().len(), 1);
}

#[test]
fn test_slow_streamed_upload_is_not_cut_by_status_timeout() {
    let service = FakeService::start(vec![respond(
        "200 OK",
        &[("Content-Type", "application/json")],
        r#"{"rows_created": 5}"#,
    )]);

    let mut produced = 0u32;
    let stream = LazyTransformStream::new(
        move |sink: &mut PipeWriter<'_>| -> std::io::Result<bool> {
            if produced == 5 {
                return Ok(false);
            }
            thread::sleep(Duration::from_millis(150));
            produced += 1;
            sink.write_all(format!("{},slow\n", produced).as_bytes())?;
            Ok(true)
        },
    );

    // Producing the body takes well over the status timeout
    let issuer = HttpIssuer::with_timeout(Duration::from_millis(300)).unwrap();
    let result: UpsertResult = issuer
        .perform(
            &engine(0),
            Method::POST,
            service.url("/datasets/abcd-1234"),
            "abcd-1234",
            Some(Payload::stream(stream, "text/csv")),
        )
        .unwrap();

    assert_eq!(result, UpsertResult { rows_created: 5 });

    let requests = service.finish();
    assert_eq!(
        requests[0].body,
        b"1,slow\n2,slow\n3,slow\n4,slow\n5,slow\n".to_vec()
    );
}

#[test]
fn test_stalled_status_check_times_out_as_local_failure() {
    let service = FakeService::start_delayed(vec![
        (
            respond(
                "202 Accepted",
                &[("Location", "/status/1"), ("Retry-After", "0")],
                "",
            ),
            Duration::ZERO,
        ),
        (
            respond("200 OK", &[], r#"{"rows_created": 1}"#),
            Duration::from_millis(1500),
        ),
    ]);

    let issuer = HttpIssuer::with_timeout(Duration::from_millis(200)).unwrap();
    let err: ContinuationError<UpsertResult> = issuer
        .perform(
            &engine(0),
            Method::POST,
            service.url("/datasets/abcd-1234"),
            "abcd-1234",
            None,
        )
        .unwrap_err();

    match err {
        ContinuationError::RetriesExhausted { source, ticket, .. } => {
            assert!(source.is_local());
            let location = ticket.signal().location().unwrap_or_default();
            assert!(location.ends_with("/status/1"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(service.finish().len(), 2);
}

#[derive(Clone, Copy)]
struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Clone, Default)]
struct RecordingSleeper(Arc<Mutex<Vec<Duration>>>);

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.0.lock().unwrap().push(duration);
        Ok(())
    }
}

#[test]
fn test_deadlines_are_stamped_with_engine_clock() {
    let service = FakeService::start(vec![
        respond(
            "202 Accepted",
            &[("Location", "/status/4"), ("Retry-After", "5")],
            "",
        ),
        respond(
            "202 Accepted",
            &[("Location", "/status/4"), ("Retry-After", "5")],
            "",
        ),
    ]);

    let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let sleeper = RecordingSleeper::default();
    let engine = Continuation::with_parts(
        ContinuationPolicy {
            max_local_retries: 0,
            max_poll_attempts: 1,
            retry_interval: Duration::from_millis(10),
        },
        FixedClock(now),
        sleeper.clone(),
    );

    let issuer = HttpIssuer::new().unwrap();
    let err: ContinuationError<UpsertResult> = issuer
        .perform(
            &engine,
            Method::POST,
            service.url("/datasets/abcd-1234"),
            "abcd-1234",
            None,
        )
        .unwrap_err();

    match err {
        ContinuationError::PollLimitReached { attempts, ticket } => {
            assert_eq!(attempts, 1);
            assert_eq!(
                ticket.signal().retry_not_before(),
                now + chrono::Duration::seconds(5)
            );
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(*sleeper.0.lock().unwrap(), vec![Duration::from_secs(5)]);
    assert_eq!(service.finish().len(), 2);
}
