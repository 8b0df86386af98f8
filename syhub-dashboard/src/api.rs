//! HTTP surface of the dashboard.
//!
//! Uses `std::net::TcpListener` with one thread per connection. Every
//! response except the event stream closes the connection. Endpoints:
//!
//! - `GET /`               — rendered dashboard page
//! - `GET /health`         — service states, system load, ingest counters (JSON)
//! - `GET /api/latest`     — latest sample per metric plus `lastUpdate` (JSON)
//! - `GET /api/telemetry`  — full snapshot of every series (JSON)
//! - `GET /api/events`     — server-sent events, one latest-values frame per tick
//!
//! Request lines and headers are capped at [`MAX_LINE_BYTES`] each and at
//! [`MAX_HEADERS`] headers; larger requests get a 400.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use syhub::alert::Threshold;
use syhub::ingest::IngestStats;
use syhub::{HealthCollector, Page, Snapshot, SnapshotReader, evaluate_thresholds};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest accepted request or header line, including the line ending.
pub const MAX_LINE_BYTES: u64 = 8 * 1024;

/// Most headers accepted in one request.
pub const MAX_HEADERS: usize = 100;

/// Time between two frames on `/api/events`.
pub const EVENT_INTERVAL: Duration = Duration::from_secs(3);

const EVENTS_PATH: &str = "/api/events";

const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_EVENTS: &str = "text/event-stream";

/// Everything a request handler can read.
#[derive(Debug)]
pub struct AppState {
    /// Shown in the page title and header.
    pub project_name: String,
    /// Read side of the series store.
    pub reader: SnapshotReader,
    /// Checked on every page and health request.
    pub health: HealthCollector,
    /// Acceptable ranges for alerting.
    pub thresholds: BTreeMap<String, Threshold>,
    /// Counters from the ingestion thread.
    pub ingest: Arc<IngestStats>,
    /// Pause between frames on the event stream.
    pub event_interval: Duration,
}

/// A response ready to be written to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header.
    pub content_type: &'static str,
    /// Response body.
    pub body: String,
}

impl Response {
    fn html(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_HTML,
            body,
        }
    }

    fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_JSON,
            body,
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }).to_string())
    }
}

/// Accepts connections until the listener fails (blocking).
pub fn run_api_server(listener: TcpListener, state: Arc<AppState>) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("accept error: {e}");
                continue;
            }
        };

        let state = Arc::clone(&state);
        thread::spawn(move || {
            let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
            if let Err(e) = handle_connection(&stream, &state) {
                tracing::debug!("request error: {e}");
            }
        });
    }
}

/// Reads one request from `stream` and writes the response.
fn handle_connection(stream: &TcpStream, state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if !read_bounded_line(&mut reader, &mut request_line)? {
        return send_response(stream, &Response::error(400, "request line too long"));
    }

    let Some((method, target)) = parse_request_line(&request_line) else {
        return send_response(stream, &Response::error(400, "bad request"));
    };

    if !drain_headers(&mut reader)? {
        return send_response(stream, &Response::error(400, "headers too large"));
    }

    let path = target.split_once('?').map_or(target, |(path, _)| path);
    tracing::debug!(method, path, "request");

    if method == "GET" && path == EVENTS_PATH {
        return stream_events(stream, state);
    }
    send_response(stream, &route(method, path, state))
}

/// Reads one line of at most [`MAX_LINE_BYTES`] into `line`.
///
/// Returns `false` if the line was cut off at the limit.
fn read_bounded_line<R: BufRead>(reader: &mut R, line: &mut String) -> io::Result<bool> {
    let mut limited = reader.by_ref().take(MAX_LINE_BYTES);
    limited.read_line(line)?;
    Ok(line.ends_with('\n') || limited.limit() > 0)
}

/// Skips the header block. Headers are not used.
///
/// Returns `false` if a header line is too long or there are more than
/// [`MAX_HEADERS`] of them.
fn drain_headers<R: BufRead>(reader: &mut R) -> io::Result<bool> {
    let mut line = String::new();
    for _ in 0..=MAX_HEADERS {
        line.clear();
        if !read_bounded_line(reader, &mut line)? {
            return Ok(false);
        }
        if line.trim().is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Splits `"GET /path HTTP/1.1"` into method and target.
fn parse_request_line(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if !version.starts_with("HTTP/") || !target.starts_with('/') {
        return None;
    }
    Some((method, target))
}

/// Dispatches a request to its handler.
///
/// `/api/events` streams and is handled before routing.
pub fn route(method: &str, path: &str, state: &AppState) -> Response {
    if method != "GET" {
        return Response::error(405, "method not allowed");
    }

    match path {
        "/" => handle_index(state),
        "/health" => handle_health(state),
        "/api/latest" => handle_latest(state),
        "/api/telemetry" => handle_telemetry(state),
        _ => Response::error(404, "not found"),
    }
}

/// `GET /`
fn handle_index(state: &AppState) -> Response {
    let snapshot = state.reader.read();
    let report = state.health.collect();
    let alerts = evaluate_thresholds(&snapshot, &state.thresholds);

    let page = Page::new(&state.project_name, &snapshot, &report.system, &report.services)
        .with_alerts(&alerts);
    match page.render() {
        Ok(html) => Response::html(200, html),
        Err(e) => {
            tracing::error!("failed to render dashboard: {e}");
            Response::error(500, "render failed")
        }
    }
}

/// `GET /health`
fn handle_health(state: &AppState) -> Response {
    let report = state.health.collect();
    let status = if report.all_active() { "ok" } else { "degraded" };

    let body = serde_json::json!({
        "status": status,
        "system": report.system,
        "services": report.services,
        "ingest": state.ingest.summary(),
    });
    Response::json(200, body.to_string())
}

/// `GET /api/latest`
fn handle_latest(state: &AppState) -> Response {
    let snapshot = state.reader.read();
    to_json_response(&snapshot.latest_with_timestamp())
}

/// `GET /api/telemetry`
fn handle_telemetry(state: &AppState) -> Response {
    to_json_response(&state.reader.read())
}

fn to_json_response<T: serde::Serialize>(value: &T) -> Response {
    match serde_json::to_string(value) {
        Ok(body) => Response::json(200, body),
        Err(e) => {
            tracing::error!("failed to encode response: {e}");
            Response::error(500, "encoding failed")
        }
    }
}

/// `GET /api/events`
///
/// Writes one frame from a fresh snapshot every `event_interval` until the
/// client goes away.
fn stream_events(mut stream: &TcpStream, state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    write!(
        stream,
        "HTTP/1.1 200 OK\r\n\
         Content-Type: {CONTENT_TYPE_EVENTS}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: keep-alive\r\n\
         Access-Control-Allow-Origin: *\r\n\
         \r\n"
    )?;

    loop {
        stream.write_all(event_frame(&state.reader.read())?.as_bytes())?;
        stream.flush()?;
        thread::sleep(state.event_interval);
    }
}

/// Encodes the latest values of `snapshot` as one server-sent event.
pub fn event_frame(snapshot: &Snapshot) -> serde_json::Result<String> {
    let data = serde_json::to_string(&snapshot.latest_with_timestamp())?;
    Ok(format!("data: {data}\n\n"))
}

/// Writes `response` and closes the exchange.
fn send_response(mut stream: &TcpStream, response: &Response) -> Result<(), Box<dyn std::error::Error>> {
    let status_text = match response.status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    };

    write!(
        stream,
        "HTTP/1.1 {} {status_text}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        response.status,
        response.content_type,
        response.body.len(),
        response.body,
    )?;
    stream.flush()?;

    Ok(())
}
