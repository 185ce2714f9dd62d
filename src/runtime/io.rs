//! Deadline-bounded reads and writes over a non-blocking client stream.
//!
//! The client socket is polled rather than blocked on: an empty read
//! (`WouldBlock`) yields through the [`Clock`] for [`POLL_INTERVAL`] and
//! retries until the call's own deadline expires. Each call measures its
//! deadline from its own start; there is no end-to-end request deadline.

use crate::runtime::clock::Clock;
use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::time::Duration;

/// Pause between empty polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Initial capacity of the line accumulator.
const LINE_CAPACITY: usize = 128;

/// A duplex byte stream to one client.
///
/// Reads are expected to be non-blocking and report `WouldBlock` when no
/// data is pending.
pub trait ClientStream: Read + Write {
    /// Stop sending; the peer sees EOF after any buffered response bytes.
    fn shutdown_write(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ClientStream for mio::net::TcpStream {
    fn shutdown_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// Failure of a bounded read.
#[derive(Debug)]
pub enum ReadError {
    /// Deadline expired before the read completed.
    TimedOut { received: usize },
    /// Peer closed the stream before the read completed.
    Closed { received: usize },
    /// Line exceeded the configured length limit.
    LineTooLong { limit: usize },
    /// Socket error other than `WouldBlock`/`Interrupted`.
    Io(io::Error),
}

impl ReadError {
    /// Bytes consumed by the failed call before it gave up.
    pub fn received(&self) -> usize {
        match self {
            ReadError::TimedOut { received } | ReadError::Closed { received } => *received,
            ReadError::LineTooLong { limit } => *limit,
            ReadError::Io(_) => 0,
        }
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::TimedOut { received } => {
                write!(f, "Read timed out after {} bytes", received)
            }
            ReadError::Closed { received } => {
                write!(f, "Peer closed after {} bytes", received)
            }
            ReadError::LineTooLong { limit } => write!(f, "Line longer than {} bytes", limit),
            ReadError::Io(e) => write!(f, "Socket error: {}", e),
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Read one line terminated by `\n`, with the trailing `\r` removed.
///
/// Consumes the stream one byte at a time so nothing past the line feed is
/// taken from the socket. `max_len` bounds the bytes before the line feed.
pub fn read_line<S, C>(
    stream: &mut S,
    clock: &C,
    timeout: Duration,
    max_len: usize,
) -> Result<String, ReadError>
where
    S: Read + ?Sized,
    C: Clock + ?Sized,
{
    let timeout_ms = timeout.as_millis() as u64;
    let start = clock.now_ms();
    let mut line = BytesMut::with_capacity(LINE_CAPACITY.min(max_len.max(1)));
    let mut byte = [0u8; 1];

    loop {
        match stream.read(&mut byte) {
            Ok(0) => return Err(ReadError::Closed { received: line.len() }),
            Ok(_) => {
                if byte[0] == b'\n' {
                    if line.ends_with(b"\r") {
                        line.truncate(line.len() - 1);
                    }
                    return Ok(String::from_utf8_lossy(&line).into_owned());
                }
                if line.len() >= max_len {
                    return Err(ReadError::LineTooLong { limit: max_len });
                }
                line.extend_from_slice(&byte);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                if clock.elapsed_ms(start) >= timeout_ms {
                    return Err(ReadError::TimedOut { received: line.len() });
                }
                clock.pause(POLL_INTERVAL);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(ReadError::Io(e)),
        }
    }
}

/// Fill `buf` completely or fail once `timeout` has elapsed since the call
/// started.
pub fn read_exact_within<S, C>(
    stream: &mut S,
    buf: &mut [u8],
    clock: &C,
    timeout: Duration,
) -> Result<(), ReadError>
where
    S: Read + ?Sized,
    C: Clock + ?Sized,
{
    let timeout_ms = timeout.as_millis() as u64;
    let start = clock.now_ms();
    let mut got = 0;

    while got < buf.len() {
        if clock.elapsed_ms(start) >= timeout_ms {
            return Err(ReadError::TimedOut { received: got });
        }
        match stream.read(&mut buf[got..]) {
            Ok(0) => return Err(ReadError::Closed { received: got }),
            Ok(n) => got += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => clock.pause(POLL_INTERVAL),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(ReadError::Io(e)),
        }
    }

    Ok(())
}

/// Write all of `data` or fail with `TimedOut` once `timeout` has elapsed.
pub fn write_all_within<S, C>(
    stream: &mut S,
    data: &[u8],
    clock: &C,
    timeout: Duration,
) -> io::Result<()>
where
    S: Write + ?Sized,
    C: Clock + ?Sized,
{
    let timeout_ms = timeout.as_millis() as u64;
    let start = clock.now_ms();
    let mut written = 0;

    while written < data.len() {
        match stream.write(&data[written..]) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
            }
            Ok(n) => written += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                if clock.elapsed_ms(start) >= timeout_ms {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("response write stalled after {} bytes", written),
                    ));
                }
                clock.pause(POLL_INTERVAL);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    stream.flush()
}
