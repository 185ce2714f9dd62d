//! Plain-text responses for the upload endpoint.
//!
//! Every response is a status line, `Content-Type: text/plain`, an exact
//! `Content-Length`, a blank line and the body, encoded into one buffer so it
//! goes out in a single write.

use bytes::BytesMut;
use std::borrow::Cow;

/// Response status codes used by the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    RequestTimeout,
    InternalServerError,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::RequestTimeout => 408,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::RequestTimeout => "Request Timeout",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// A complete response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub body: Cow<'static, str>,
}

impl Response {
    fn new(status: Status, body: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Frame drawn.
    pub fn ok() -> Self {
        Self::new(Status::Ok, "OK")
    }

    /// Method or path not recognised.
    pub fn not_found() -> Self {
        Self::new(Status::NotFound, "Not found")
    }

    /// Declared length differs from the expected payload size.
    pub fn length_mismatch(expected: usize, got: usize) -> Self {
        Self::new(
            Status::BadRequest,
            format!("Expected {} bytes, got {}", expected, got),
        )
    }

    /// A request-head line exceeded the line limit.
    pub fn line_too_long() -> Self {
        Self::new(Status::BadRequest, "Header line too long")
    }

    /// Request head did not arrive in time.
    pub fn header_timeout() -> Self {
        Self::new(Status::RequestTimeout, "Timeout receiving headers")
    }

    /// A body chunk did not arrive in time.
    pub fn body_timeout() -> Self {
        Self::new(Status::RequestTimeout, "Timeout receiving body")
    }

    /// A chunk buffer could not be allocated.
    pub fn out_of_memory(buffer: &str) -> Self {
        Self::new(Status::InternalServerError, format!("OOM {}", buffer))
    }

    /// The display rejected a push.
    pub fn display_fault() -> Self {
        Self::new(Status::InternalServerError, "Display write failed")
    }

    /// Encode status line, headers and body.
    pub fn encode(&self) -> BytesMut {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n",
            self.status.code(),
            self.status.reason(),
            self.body.len()
        );

        let mut out = BytesMut::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ok() {
        assert_eq!(
            &Response::ok().encode()[..],
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK"
        );
    }

    #[test]
    fn test_encode_length_mismatch() {
        let response = Response::length_mismatch(64800, 0);
        assert_eq!(response.status, Status::BadRequest);
        assert_eq!(
            &response.encode()[..],
            &b"HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain\r\n\
               Content-Length: 27\r\n\r\nExpected 64800 bytes, got 0"[..]
        );
    }

    #[test]
    fn test_status_lines() {
        let cases = [
            (Response::not_found(), "HTTP/1.1 404 Not Found\r\n", "Not found"),
            (
                Response::body_timeout(),
                "HTTP/1.1 408 Request Timeout\r\n",
                "Timeout receiving body",
            ),
            (
                Response::out_of_memory("wire_buf"),
                "HTTP/1.1 500 Internal Server Error\r\n",
                "OOM wire_buf",
            ),
        ];

        for (response, status_line, body) in cases {
            let encoded = response.encode();
            let text = std::str::from_utf8(&encoded).unwrap();
            assert!(text.starts_with(status_line), "{}", text);
            assert!(text.ends_with(&format!("\r\n\r\n{}", body)), "{}", text);
            assert!(text.contains(&format!("Content-Length: {}\r\n", body.len())));
        }
    }
}
