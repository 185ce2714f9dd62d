//! Request head parser for the upload endpoint.
//!
//! Only one request shape is recognised:
//!
//! ```text
//! POST <target containing the upload path> HTTP/1.1\r\n
//! Name: value\r\n
//! ...
//! \r\n
//! <body>
//! ```
//!
//! Parsing works on whole lines pulled from a [`LineSource`], so it can be
//! driven by the socket or by canned bytes. Of all headers only
//! `Content-Length` is kept; everything else is discarded as it is read.

use crate::runtime::clock::Clock;
use crate::runtime::io::{read_line, ReadError};
use std::io::Read;
use std::time::Duration;

/// The only accepted method.
pub const UPLOAD_METHOD: &str = "POST";

/// Source of request-head lines with line terminators removed.
pub trait LineSource {
    fn next_line(&mut self) -> Result<String, ReadError>;
}

/// Lines read from a client stream, each under its own deadline.
pub struct SocketLines<'a, S: ?Sized, C: ?Sized> {
    stream: &'a mut S,
    clock: &'a C,
    timeout: Duration,
    max_len: usize,
}

impl<'a, S: ?Sized, C: ?Sized> SocketLines<'a, S, C> {
    pub fn new(stream: &'a mut S, clock: &'a C, timeout: Duration, max_len: usize) -> Self {
        Self {
            stream,
            clock,
            timeout,
            max_len,
        }
    }
}

impl<S: Read + ?Sized, C: Clock + ?Sized> LineSource for SocketLines<'_, S, C> {
    fn next_line(&mut self) -> Result<String, ReadError> {
        read_line(&mut *self.stream, self.clock, self.timeout, self.max_len)
    }
}

/// Parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
}

/// Request line plus the one header that matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub request_line: RequestLine,
    /// Declared body length; 0 when missing or not numeric.
    pub content_length: usize,
    /// Header lines seen before the blank line.
    pub header_count: usize,
}

/// Why a request head was not accepted.
#[derive(Debug)]
pub enum HeadError {
    /// Blank request line, or nothing arrived before close/timeout.
    Empty,
    /// Method or target does not match the upload endpoint.
    NotFound { request_line: String },
    /// Reading a line failed part-way through the head.
    Read(ReadError),
}

impl std::fmt::Display for HeadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadError::Empty => write!(f, "Empty request"),
            HeadError::NotFound { request_line } => {
                write!(f, "Not the upload endpoint: {}", request_line)
            }
            HeadError::Read(e) => write!(f, "Failed to read request head: {}", e),
        }
    }
}

impl std::error::Error for HeadError {}

/// Match a request line against `POST` and the upload path.
///
/// The method must be the first token; the path may appear anywhere in the
/// target (query strings and prefixes are tolerated).
pub fn parse_request_line(line: &str, upload_path: &str) -> Option<RequestLine> {
    let rest = line.trim().strip_prefix(UPLOAD_METHOD)?.strip_prefix(' ')?;
    if !rest.contains(upload_path) {
        return None;
    }

    let target = rest.split_whitespace().next().unwrap_or_default();
    Some(RequestLine {
        method: UPLOAD_METHOD.to_string(),
        target: target.to_string(),
    })
}

/// Split `Name: value` on the first colon, trimming both sides.
pub fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    Some((name.trim(), value.trim()))
}

/// Parse the leading decimal digits of a header value.
///
/// Missing or non-numeric input yields 0; overflow saturates.
pub fn parse_content_length(value: &str) -> usize {
    value
        .trim()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0usize, |acc, d| {
            acc.saturating_mul(10).saturating_add((d - b'0') as usize)
        })
}

/// Read and validate a request head.
///
/// Header lines are consumed only after the request line matched the upload
/// endpoint. Nothing past the terminating blank line is read.
pub fn read_request_head<L: LineSource + ?Sized>(
    lines: &mut L,
    upload_path: &str,
) -> Result<RequestHead, HeadError> {
    let line = match lines.next_line() {
        Ok(line) => line,
        Err(ReadError::TimedOut { received: 0 }) | Err(ReadError::Closed { received: 0 }) => {
            return Err(HeadError::Empty)
        }
        Err(e) => return Err(HeadError::Read(e)),
    };

    let line = line.trim();
    if line.is_empty() {
        return Err(HeadError::Empty);
    }

    let request_line =
        parse_request_line(line, upload_path).ok_or_else(|| HeadError::NotFound {
            request_line: line.to_string(),
        })?;

    let mut content_length = 0;
    let mut header_count = 0;
    loop {
        let header = lines.next_line().map_err(HeadError::Read)?;
        if header.is_empty() {
            break;
        }
        header_count += 1;

        if let Some((name, value)) = parse_header_line(&header) {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = parse_content_length(value);
            }
        }
    }

    Ok(RequestHead {
        request_line,
        content_length,
        header_count,
    })
}
