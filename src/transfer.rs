//! Chunked body transfer engine.
//!
//! Streams an upload body straight to the display in row-aligned chunks:
//!
//! ```text
//! Receiving { cursor } --read chunk--> decode --push rows--> Receiving { cursor + rows }
//!        |                                                          |
//!        +--deadline / close / I/O / display error--> Failed        +--cursor == height--> Done
//! ```
//!
//! Each chunk gets its own read deadline measured from the start of that
//! chunk. A chunk is drawn only once all of its bytes have arrived, so a
//! stalled or truncated upload leaves exactly the fully received rows on the
//! panel. The engine never holds more than one chunk of image data.

use crate::display::{Display, DisplayError};
use crate::runtime::buffer::ChunkBuffers;
use crate::runtime::clock::Clock;
use crate::runtime::io::{read_exact_within, ReadError};
use std::io::{self, Read};
use std::time::Duration;
use tracing::trace;

/// Fixed dimensions of the uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGeometry {
    pub width: u16,
    pub height: u16,
}

impl ImageGeometry {
    /// Bytes per pixel on the wire.
    pub const BYTES_PER_PIXEL: usize = 2;

    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Exact body length an upload must declare.
    pub fn payload_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }
}

/// Progress of a body transfer.
#[derive(Debug)]
pub enum TransferState {
    /// Waiting for the chunk starting at row `cursor`.
    Receiving { cursor: u16 },
    /// Every row has been drawn.
    Done,
    /// Transfer aborted; rows before the failing chunk remain drawn.
    Failed(TransferFailure),
}

/// Why a transfer stopped early. `row` is the first row of the failed chunk.
#[derive(Debug)]
pub enum TransferFailure {
    Timeout { row: u16, received: usize },
    Closed { row: u16, received: usize },
    Io { row: u16, error: io::Error },
    Display { row: u16, error: DisplayError },
}

impl TransferFailure {
    fn from_read(row: u16, err: ReadError) -> Self {
        match err {
            ReadError::TimedOut { received } => TransferFailure::Timeout { row, received },
            ReadError::Closed { received } => TransferFailure::Closed { row, received },
            ReadError::Io(error) => TransferFailure::Io { row, error },
            ReadError::LineTooLong { .. } => TransferFailure::Io {
                row,
                error: io::Error::new(io::ErrorKind::InvalidData, "unexpected line limit"),
            },
        }
    }

    pub fn row(&self) -> u16 {
        match self {
            TransferFailure::Timeout { row, .. }
            | TransferFailure::Closed { row, .. }
            | TransferFailure::Io { row, .. }
            | TransferFailure::Display { row, .. } => *row,
        }
    }
}

impl std::fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferFailure::Timeout { row, received } => write!(
                f,
                "Timed out at row {} after {} bytes of the chunk",
                row, received
            ),
            TransferFailure::Closed { row, received } => write!(
                f,
                "Peer closed at row {} after {} bytes of the chunk",
                row, received
            ),
            TransferFailure::Io { row, error } => write!(f, "Socket error at row {}: {}", row, error),
            TransferFailure::Display { row, error } => {
                write!(f, "Display error at row {}: {}", row, error)
            }
        }
    }
}

/// Summary of a finished transfer.
#[derive(Debug)]
pub struct TransferReport {
    /// `Ok` once every row was drawn and presented.
    pub result: Result<(), TransferFailure>,
    pub rows_drawn: u16,
    pub chunks: usize,
    pub bytes_received: usize,
    pub elapsed_ms: u64,
}

/// Decode little-endian wire pixels into native pixels.
///
/// Each `(lo, hi)` byte pair becomes `lo | hi << 8` before `to_native` maps
/// it to the display's representation.
pub fn decode_wire_pixels<P>(wire: &[u8], out: &mut [P], to_native: impl Fn(u16) -> P) {
    for (dst, pair) in out.iter_mut().zip(wire.chunks_exact(2)) {
        *dst = to_native(u16::from_le_bytes([pair[0], pair[1]]));
    }
}

/// Row-cursor state machine moving one body from a stream to a display.
pub struct BodyTransfer<'a, S: ?Sized, C: ?Sized, D: Display> {
    stream: &'a mut S,
    clock: &'a C,
    display: &'a mut D,
    buffers: &'a mut ChunkBuffers<D::Pixel>,
    geometry: ImageGeometry,
    chunk_timeout: Duration,
    state: TransferState,
    rows_drawn: u16,
    chunks: usize,
    bytes_received: usize,
}

impl<'a, S, C, D> BodyTransfer<'a, S, C, D>
where
    S: Read + ?Sized,
    C: Clock + ?Sized,
    D: Display,
{
    pub fn new(
        stream: &'a mut S,
        clock: &'a C,
        display: &'a mut D,
        buffers: &'a mut ChunkBuffers<D::Pixel>,
        geometry: ImageGeometry,
        chunk_timeout: Duration,
    ) -> Self {
        let state = if geometry.height == 0 {
            TransferState::Done
        } else {
            TransferState::Receiving { cursor: 0 }
        };

        Self {
            stream,
            clock,
            display,
            buffers,
            geometry,
            chunk_timeout,
            state,
            rows_drawn: 0,
            chunks: 0,
            bytes_received: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &TransferState {
        &self.state
    }

    /// Receive, decode and draw one chunk. No-op once terminal.
    pub fn step(&mut self) {
        let cursor = match self.state {
            TransferState::Receiving { cursor } => cursor,
            _ => return,
        };

        let remaining = (self.geometry.height - cursor) as usize;
        let rows_this = self.buffers.rows().min(remaining);

        let wire = self.buffers.wire_mut(rows_this);
        let bytes_needed = wire.len();
        if let Err(e) = read_exact_within(&mut *self.stream, wire, self.clock, self.chunk_timeout) {
            self.bytes_received += e.received();
            self.state = TransferState::Failed(TransferFailure::from_read(cursor, e));
            return;
        }
        self.bytes_received += bytes_needed;

        let (wire, pixels) = self.buffers.split_mut(rows_this);
        decode_wire_pixels(wire, pixels, D::to_native);

        trace!(row = cursor, rows = rows_this, bytes = bytes_needed, "Chunk received");

        if let Err(error) =
            self.display
                .push_image(0, cursor, self.geometry.width, rows_this as u16, pixels)
        {
            self.state = TransferState::Failed(TransferFailure::Display { row: cursor, error });
            return;
        }

        self.chunks += 1;
        let next = cursor + rows_this as u16;
        self.rows_drawn = next;
        self.state = if next >= self.geometry.height {
            TransferState::Done
        } else {
            TransferState::Receiving { cursor: next }
        };
    }

    /// Drive the state machine to completion and present a finished frame.
    pub fn run(mut self) -> TransferReport {
        let start = self.clock.now_ms();
        let height = self.geometry.height;

        let result = loop {
            match self.state {
                TransferState::Receiving { .. } => self.step(),
                TransferState::Done => {
                    break self
                        .display
                        .present()
                        .map_err(|error| TransferFailure::Display { row: height, error });
                }
                TransferState::Failed(failure) => break Err(failure),
            }
        };

        TransferReport {
            result,
            rows_drawn: self.rows_drawn,
            chunks: self.chunks,
            bytes_received: self.bytes_received,
            elapsed_ms: self.clock.elapsed_ms(start),
        }
    }
}
