//! Test doubles shared by the unit tests: a manual clock, a scripted
//! non-blocking stream and a display that records every push.

use crate::display::{Display, DisplayError, Framebuffer};
use crate::runtime::clock::Clock;
use crate::runtime::io::ClientStream;
use std::cell::Cell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Clock that only moves when paused or advanced explicitly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn pause(&self, duration: Duration) {
        self.advance(duration.as_millis() as u64);
    }
}

enum Segment {
    Data(Vec<u8>),
    /// Number of polls that report `WouldBlock`.
    Stall(u64),
}

/// Non-blocking stream replaying a script of data and stalls.
///
/// Each stalled poll corresponds to one `POLL_INTERVAL` pause of the reader,
/// so `stall_ms(n)` holds the reader for about `n` ms of `ManualClock` time.
/// Once the script is exhausted the stream stalls forever, or reports EOF if
/// built with `close()`.
pub struct ScriptedStream {
    script: VecDeque<Segment>,
    closed: bool,
    consumed: usize,
    written: Vec<u8>,
    shutdown: bool,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            closed: false,
            consumed: 0,
            written: Vec::new(),
            shutdown: false,
        }
    }

    pub fn data(mut self, bytes: &[u8]) -> Self {
        self.script.push_back(Segment::Data(bytes.to_vec()));
        self
    }

    pub fn stall_ms(mut self, polls: u64) -> Self {
        self.script.push_back(Segment::Stall(polls));
        self
    }

    pub fn close(mut self) -> Self {
        self.closed = true;
        self
    }

    /// Bytes handed out to the reader so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Bytes the code under test wrote.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.script.front_mut() {
                Some(Segment::Data(data)) => {
                    if data.is_empty() {
                        self.script.pop_front();
                        continue;
                    }
                    let n = buf.len().min(data.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    data.drain(..n);
                    self.consumed += n;
                    return Ok(n);
                }
                Some(Segment::Stall(polls)) => {
                    if *polls == 0 {
                        self.script.pop_front();
                        continue;
                    }
                    *polls -= 1;
                    return Err(io::ErrorKind::WouldBlock.into());
                }
                None if self.closed => return Ok(0),
                None => return Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ClientStream for ScriptedStream {
    fn shutdown_write(&mut self) -> io::Result<()> {
        self.shutdown = true;
        Ok(())
    }
}

/// One `push_image` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Push {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// Framebuffer-backed display that records the pushes it receives.
pub struct RecordingDisplay {
    pub frame: Framebuffer,
    pub pushes: Vec<Push>,
    pub presented: usize,
    fail_on_push: Option<usize>,
}

impl RecordingDisplay {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            frame: Framebuffer::new(width, height),
            pushes: Vec::new(),
            presented: 0,
            fail_on_push: None,
        }
    }

    /// Fail the push with this zero-based index.
    pub fn failing_on_push(mut self, index: usize) -> Self {
        self.fail_on_push = Some(index);
        self
    }
}

impl Display for RecordingDisplay {
    type Pixel = u16;

    fn to_native(wire: u16) -> u16 {
        wire
    }

    fn push_image(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: &[u16],
    ) -> Result<(), DisplayError> {
        if self.fail_on_push == Some(self.pushes.len()) {
            return Err(DisplayError::Io(io::Error::new(
                io::ErrorKind::Other,
                "bus fault",
            )));
        }
        self.frame.push_image(x, y, width, height, pixels)?;
        self.pushes.push(Push {
            x,
            y,
            width,
            height,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<(), DisplayError> {
        self.presented += 1;
        Ok(())
    }
}

/// Deterministic body of `len` bytes.
pub fn pattern_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

/// Reinterpret `payload` as little-endian 16-bit pixels.
pub fn expected_pixels(payload: &[u8]) -> Vec<u16> {
    payload
        .chunks_exact(2)
        .map(|p| u16::from_le_bytes([p[0], p[1]]))
        .collect()
}
