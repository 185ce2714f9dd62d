//! Upload request cycle.
//!
//! One call to [`serve_client`] handles one connection from request line to
//! response: read the head, check the declared length, allocate the chunk
//! buffers, stream the body to the display and report the outcome. Buffers
//! are released before the response is written; the stream is shut down for
//! writing on every path and closed when the caller drops it.

use super::parser::{read_request_head, HeadError, SocketLines};
use super::response::Response;
use crate::display::Display;
use crate::runtime::buffer::{peak_rss_kb, ChunkBuffers};
use crate::runtime::clock::Clock;
use crate::runtime::io::{write_all_within, ClientStream, ReadError};
use crate::transfer::{BodyTransfer, ImageGeometry, TransferFailure};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Per-request limits and the expected image shape.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub geometry: ImageGeometry,
    pub upload_path: String,
    pub chunk_rows: usize,
    pub line_timeout: Duration,
    pub chunk_timeout: Duration,
    pub response_timeout: Duration,
    pub max_line_len: usize,
    pub memory_budget: Option<usize>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            geometry: ImageGeometry::new(240, 135),
            upload_path: "/update-image".to_string(),
            chunk_rows: 4,
            line_timeout: Duration::from_millis(2000),
            chunk_timeout: Duration::from_millis(10_000),
            response_timeout: Duration::from_millis(2000),
            max_line_len: 1024,
            memory_budget: None,
        }
    }
}

/// How a request cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every row was drawn.
    Updated {
        chunks: usize,
        bytes: usize,
        elapsed_ms: u64,
    },
    /// Blank request line or nothing received.
    Empty,
    /// Peer went away or the socket failed mid-request.
    Disconnected,
    NotFound,
    LengthMismatch { expected: usize, got: usize },
    LineTooLong,
    HeaderTimeout,
    /// A body chunk starting at `row` did not arrive in full.
    BodyTimeout { row: u16 },
    OutOfMemory { buffer: &'static str },
    DisplayFault { row: u16 },
}

impl Outcome {
    /// Response to send, if the client should get one.
    pub fn response(&self) -> Option<Response> {
        match self {
            Outcome::Updated { .. } => Some(Response::ok()),
            Outcome::Empty | Outcome::Disconnected => None,
            Outcome::NotFound => Some(Response::not_found()),
            Outcome::LengthMismatch { expected, got } => {
                Some(Response::length_mismatch(*expected, *got))
            }
            Outcome::LineTooLong => Some(Response::line_too_long()),
            Outcome::HeaderTimeout => Some(Response::header_timeout()),
            Outcome::BodyTimeout { .. } => Some(Response::body_timeout()),
            Outcome::OutOfMemory { buffer } => Some(Response::out_of_memory(buffer)),
            Outcome::DisplayFault { .. } => Some(Response::display_fault()),
        }
    }
}

/// Serve one upload request on `stream`.
pub fn serve_client<S, C, D>(
    stream: &mut S,
    clock: &C,
    display: &mut D,
    settings: &UploadSettings,
) -> Outcome
where
    S: ClientStream + ?Sized,
    C: Clock + ?Sized,
    D: Display,
{
    let outcome = receive(&mut *stream, clock, display, settings);

    if let Some(response) = outcome.response() {
        match write_all_within(&mut *stream, &response.encode(), clock, settings.response_timeout) {
            Ok(()) => debug!(status = response.status.code(), "Response sent"),
            Err(e) => warn!(status = response.status.code(), error = %e, "Failed to send response"),
        }
    }

    if let Err(e) = stream.shutdown_write() {
        trace!(error = %e, "Shutdown after response failed");
    }

    outcome
}

fn receive<S, C, D>(stream: &mut S, clock: &C, display: &mut D, settings: &UploadSettings) -> Outcome
where
    S: ClientStream + ?Sized,
    C: Clock + ?Sized,
    D: Display,
{
    let head = {
        let mut lines = SocketLines::new(
            &mut *stream,
            clock,
            settings.line_timeout,
            settings.max_line_len,
        );
        match read_request_head(&mut lines, &settings.upload_path) {
            Ok(head) => head,
            Err(HeadError::Empty) => {
                debug!("Empty request");
                return Outcome::Empty;
            }
            Err(HeadError::NotFound { request_line }) => {
                info!(request = %request_line, "Not the upload endpoint");
                return Outcome::NotFound;
            }
            Err(HeadError::Read(ReadError::TimedOut { received })) => {
                warn!(received, "Timeout receiving headers");
                return Outcome::HeaderTimeout;
            }
            Err(HeadError::Read(ReadError::LineTooLong { limit })) => {
                warn!(limit, "Header line too long");
                return Outcome::LineTooLong;
            }
            Err(HeadError::Read(e)) => {
                debug!(error = %e, "Client went away during headers");
                return Outcome::Disconnected;
            }
        }
    };

    let expected = settings.geometry.payload_len();
    info!(
        method = %head.request_line.method,
        path = %head.request_line.target,
        content_length = head.content_length,
        headers = head.header_count,
        "Upload request"
    );

    if head.content_length != expected {
        warn!(expected, got = head.content_length, "Bad Content-Length");
        return Outcome::LengthMismatch {
            expected,
            got: head.content_length,
        };
    }

    let mut buffers = match ChunkBuffers::<D::Pixel>::allocate(
        settings.geometry.width as usize,
        settings.chunk_rows,
        settings.memory_budget,
    ) {
        Ok(buffers) => buffers,
        Err(e) => {
            warn!(
                buffer = e.buffer,
                requested = e.requested,
                budget = ?settings.memory_budget,
                peak_rss_kb = ?peak_rss_kb(),
                "Chunk buffer allocation failed"
            );
            return Outcome::OutOfMemory { buffer: e.buffer };
        }
    };

    debug!(
        chunk_rows = buffers.rows(),
        footprint = buffers.footprint(),
        "Receiving body in chunks"
    );

    let report = BodyTransfer::new(
        &mut *stream,
        clock,
        display,
        &mut buffers,
        settings.geometry,
        settings.chunk_timeout,
    )
    .run();

    match report.result {
        Ok(()) => {
            info!(
                chunks = report.chunks,
                bytes = report.bytes_received,
                elapsed_ms = report.elapsed_ms,
                "Image updated"
            );
            Outcome::Updated {
                chunks: report.chunks,
                bytes: report.bytes_received,
                elapsed_ms: report.elapsed_ms,
            }
        }
        Err(failure) => {
            warn!(
                row = failure.row(),
                rows_drawn = report.rows_drawn,
                bytes = report.bytes_received,
                elapsed_ms = report.elapsed_ms,
                peak_rss_kb = ?peak_rss_kb(),
                error = %failure,
                "Body transfer failed"
            );
            match failure {
                TransferFailure::Timeout { row, .. } | TransferFailure::Closed { row, .. } => {
                    Outcome::BodyTimeout { row }
                }
                TransferFailure::Io { .. } => Outcome::Disconnected,
                TransferFailure::Display { row, .. } => Outcome::DisplayFault { row },
            }
        }
    }
}
