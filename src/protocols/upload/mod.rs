//! Raw frame upload protocol.
//!
//! A single HTTP/1.1-shaped endpoint that accepts one fixed-size image per
//! connection:
//! - Client sends: `POST /update-image HTTP/1.1`, headers including
//!   `Content-Length`, a blank line, then `width * height * 2` bytes of
//!   little-endian 16-bit pixels, row-major, no padding
//! - Server responds: a `text/plain` status line and body, then closes
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  POST /update-image HTTP/1.1\r\n
//!           Content-Length: 64800\r\n
//!           \r\n
//!           <64800 bytes>
//! Response: HTTP/1.1 200 OK\r\n
//!           Content-Type: text/plain\r\n
//!           Content-Length: 2\r\n
//!           \r\n
//!           OK
//! ```
//!
//! There is no routing, no chunked transfer-encoding and no keep-alive.

pub mod handler;
pub mod parser;
pub mod response;

pub use handler::{serve_client, Outcome, UploadSettings};
