//! Per-request chunk buffers.
//!
//! A request allocates exactly two buffers up front and reuses them for every
//! chunk of the body:
//! - `wire_buf`: raw body bytes for `chunk_rows` rows
//! - `pixel_buf`: the same rows converted to native pixels
//!
//! Their size depends on the image width and `chunk_rows` only, never on the
//! image height. Allocation is fallible: a real allocator failure or an
//! optional byte budget (modelling a small embedded heap) both surface as
//! [`AllocError`] before any body byte is read.

use std::mem::size_of;

/// Error returned when a chunk buffer cannot be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    /// Name of the buffer that failed (`wire_buf` or `pixel_buf`).
    pub buffer: &'static str,
    /// Bytes requested for that buffer.
    pub requested: usize,
}

impl std::fmt::Display for AllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to allocate {} ({} bytes)", self.buffer, self.requested)
    }
}

impl std::error::Error for AllocError {}

/// Wire and native buffers sized for `rows` rows of `width` pixels.
pub struct ChunkBuffers<P> {
    wire: Vec<u8>,
    pixels: Vec<P>,
    width: usize,
    rows: usize,
}

impl<P: Copy + Default> ChunkBuffers<P> {
    /// Allocate both buffers.
    ///
    /// `budget`, when set, caps the combined footprint in bytes; the wire
    /// buffer is charged first.
    pub fn allocate(width: usize, rows: usize, budget: Option<usize>) -> Result<Self, AllocError> {
        // Sizes that do not fit in usize are reported as usize::MAX.
        let pixel_count = width.checked_mul(rows);
        let wire_bytes = pixel_count
            .and_then(|n| n.checked_mul(2))
            .ok_or(AllocError {
                buffer: "wire_buf",
                requested: usize::MAX,
            })?;
        let pixel_count = wire_bytes / 2;
        let pixel_bytes = pixel_count
            .checked_mul(size_of::<P>())
            .ok_or(AllocError {
                buffer: "pixel_buf",
                requested: usize::MAX,
            })?;

        let mut remaining = budget.unwrap_or(usize::MAX);

        if wire_bytes > remaining {
            return Err(AllocError {
                buffer: "wire_buf",
                requested: wire_bytes,
            });
        }
        let wire = try_alloc(wire_bytes, 0u8).ok_or(AllocError {
            buffer: "wire_buf",
            requested: wire_bytes,
        })?;
        remaining -= wire_bytes;

        if pixel_bytes > remaining {
            return Err(AllocError {
                buffer: "pixel_buf",
                requested: pixel_bytes,
            });
        }
        let pixels = try_alloc(pixel_count, P::default()).ok_or(AllocError {
            buffer: "pixel_buf",
            requested: pixel_bytes,
        })?;

        Ok(Self {
            wire,
            pixels,
            width,
            rows,
        })
    }

    /// Row capacity of one chunk.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Combined size of both buffers in bytes.
    pub fn footprint(&self) -> usize {
        self.wire.len() + self.pixels.len() * size_of::<P>()
    }

    /// Wire slice for `rows` rows (`rows` must not exceed the capacity).
    pub fn wire_mut(&mut self, rows: usize) -> &mut [u8] {
        debug_assert!(rows <= self.rows, "chunk exceeds buffer capacity");
        &mut self.wire[..self.width * rows * 2]
    }

    /// Both buffers for `rows` rows: filled wire bytes and the native output.
    pub fn split_mut(&mut self, rows: usize) -> (&[u8], &mut [P]) {
        debug_assert!(rows <= self.rows, "chunk exceeds buffer capacity");
        let count = self.width * rows;
        (&self.wire[..count * 2], &mut self.pixels[..count])
    }
}

fn try_alloc<T: Copy>(len: usize, fill: T) -> Option<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    v.resize(len, fill);
    Some(v)
}

/// Peak resident set size of this process in KiB, if the platform reports it.
pub fn peak_rss_kb() -> Option<u64> {
    #[cfg(unix)]
    {
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        // SAFETY: `usage` is a valid, writable rusage for the call's duration.
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
        if rc != 0 {
            return None;
        }
        let max_rss = usage.ru_maxrss as u64;
        // macOS reports bytes, Linux reports KiB.
        if cfg!(target_os = "macos") {
            Some(max_rss / 1024)
        } else {
            Some(max_rss)
        }
    }

    #[cfg(not(unix))]
    {
        None
    }
}
