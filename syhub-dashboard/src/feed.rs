//! Telemetry feed transport.
//!
//! The feed is line-delimited JSON: one telemetry message per line, read
//! either from TCP clients or from stdin. Each non-empty line is forwarded
//! verbatim to the ingestion thread; decoding happens there.
//!
//! Lines longer than [`MAX_LINE_BYTES`] are discarded without being
//! buffered in full.

use std::io::{self, BufRead, BufReader, Read};
use std::net::TcpListener;
use std::sync::mpsc::Sender;
use std::thread;

/// Longest accepted feed line, excluding the newline.
pub const MAX_LINE_BYTES: u64 = 64 * 1024;

/// Outcome of reading one bounded line.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// A complete line is in the buffer.
    Line,
    /// The line exceeded the limit and was skipped.
    Oversized,
    /// End of input.
    Eof,
}

/// Reads one line of at most [`MAX_LINE_BYTES`] into `line`.
fn read_bounded_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<LineRead> {
    line.clear();
    let mut limited = reader.by_ref().take(MAX_LINE_BYTES + 1);
    if limited.read_until(b'\n', line)? == 0 {
        return Ok(LineRead::Eof);
    }
    if line.ends_with(b"\n") || limited.limit() > 0 {
        return Ok(LineRead::Line);
    }

    line.clear();
    skip_line(reader)?;
    Ok(LineRead::Oversized)
}

/// Consumes input up to and including the next newline.
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Forwards every non-empty line of `reader` to `messages`.
///
/// Stops at end of input, or early once the receiving side is gone.
/// Oversized lines are logged and skipped. Returns the number of lines
/// forwarded.
///
/// # Errors
///
/// Returns any I/O error from `reader`.
pub fn forward_lines<R: BufRead>(mut reader: R, messages: &Sender<Vec<u8>>) -> io::Result<usize> {
    let mut forwarded = 0;
    let mut line = Vec::new();

    loop {
        match read_bounded_line(&mut reader, &mut line)? {
            LineRead::Eof => return Ok(forwarded),
            LineRead::Oversized => {
                tracing::warn!("dropping feed line longer than {MAX_LINE_BYTES} bytes");
                continue;
            }
            LineRead::Line => {}
        }

        let payload = line.trim_ascii();
        if payload.is_empty() {
            continue;
        }
        if messages.send(payload.to_vec()).is_err() {
            tracing::debug!("ingestion stopped, closing feed");
            return Ok(forwarded);
        }
        forwarded += 1;
    }
}

/// Accepts feed clients until the listener fails (blocking).
///
/// Each client gets its own reader thread.
pub fn run_tcp_feed(listener: TcpListener, messages: &Sender<Vec<u8>>) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("feed accept error: {e}");
                continue;
            }
        };

        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_string(), |addr| addr.to_string());
        let messages = messages.clone();
        thread::spawn(move || {
            tracing::info!(%peer, "feed client connected");
            match forward_lines(BufReader::new(stream), &messages) {
                Ok(lines) => tracing::info!(%peer, lines, "feed client disconnected"),
                Err(e) => tracing::warn!(%peer, "feed client error: {e}"),
            }
        });
    }
}

/// Reads the feed from stdin until end of input (blocking).
pub fn run_stdin_feed(messages: &Sender<Vec<u8>>) {
    match forward_lines(io::stdin().lock(), messages) {
        Ok(lines) => tracing::info!(lines, "stdin feed closed"),
        Err(e) => tracing::error!("stdin feed failed: {e}"),
    }
}
