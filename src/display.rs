//! Display abstraction and the host framebuffer.
//!
//! The transfer engine only needs two things from a panel: a way to turn a
//! 16-bit wire pixel into whatever the panel stores natively, and a
//! primitive that pushes a rectangle of native pixels at `(x, y)`. Panel
//! initialisation happens before the server starts and is not modelled here.
//!
//! `Framebuffer` is the host implementation: an in-memory RGB565 frame that
//! can optionally be written out as a PPM snapshot after each completed
//! upload.

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A panel that accepts rectangles of native pixels.
pub trait Display {
    /// Pixel representation the push primitive consumes.
    type Pixel: Copy + Default;

    /// Map a little-endian wire pixel value to the native representation.
    fn to_native(wire: u16) -> Self::Pixel;

    /// Draw `pixels` (row-major, `width * height` entries) at `(x, y)`.
    fn push_image(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: &[Self::Pixel],
    ) -> Result<(), DisplayError>;

    /// Called once after a complete frame has been pushed.
    fn present(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// Display operation errors
#[derive(Debug)]
pub enum DisplayError {
    /// Rectangle does not fit on the panel.
    OutOfBounds {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    },
    /// Fewer pixels supplied than the rectangle covers.
    ShortBuffer { expected: usize, got: usize },
    /// Snapshot or device I/O failed.
    Io(io::Error),
}

impl std::fmt::Display for DisplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayError::OutOfBounds {
                x,
                y,
                width,
                height,
            } => write!(
                f,
                "Rectangle {}x{} at ({}, {}) is outside the panel",
                width, height, x, y
            ),
            DisplayError::ShortBuffer { expected, got } => {
                write!(f, "Expected {} pixels, got {}", expected, got)
            }
            DisplayError::Io(e) => write!(f, "Display I/O error: {}", e),
        }
    }
}

impl std::error::Error for DisplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DisplayError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DisplayError {
    fn from(e: io::Error) -> Self {
        DisplayError::Io(e)
    }
}

/// In-memory RGB565 panel.
pub struct Framebuffer {
    width: u16,
    height: u16,
    pixels: Vec<u16>,
    snapshot: Option<PathBuf>,
}

impl Framebuffer {
    /// Create a framebuffer cleared to black.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
            snapshot: None,
        }
    }

    /// Write a PPM snapshot to `path` on every `present`.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    /// Fill the whole panel with one colour.
    pub fn fill(&mut self, color: u16) {
        self.pixels.fill(color);
    }

    /// Pixel at `(x, y)`, or `None` outside the panel.
    #[cfg(test)]
    pub fn pixel(&self, x: u16, y: u16) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.width as usize + x as usize])
    }

    /// The whole frame, row-major.
    #[cfg(test)]
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// Encode the frame as a binary PPM (P6), expanding RGB565 to RGB888.
    pub fn to_ppm(&self) -> Vec<u8> {
        let header = format!("P6\n{} {}\n255\n", self.width, self.height);
        let mut out = Vec::with_capacity(header.len() + self.pixels.len() * 3);
        out.extend_from_slice(header.as_bytes());
        for &p in &self.pixels {
            out.extend_from_slice(&rgb565_to_rgb888(p));
        }
        out
    }

    fn write_snapshot(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_ppm())?;
        debug!(path = %path.display(), "Wrote frame snapshot");
        Ok(())
    }
}

impl Display for Framebuffer {
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
        let fits_x = x as usize + width as usize <= self.width as usize;
        let fits_y = y as usize + height as usize <= self.height as usize;
        if !fits_x || !fits_y {
            return Err(DisplayError::OutOfBounds {
                x,
                y,
                width,
                height,
            });
        }

        let w = width as usize;
        let expected = w * height as usize;
        if pixels.len() < expected {
            return Err(DisplayError::ShortBuffer {
                expected,
                got: pixels.len(),
            });
        }

        let stride = self.width as usize;
        for (row, src) in pixels[..expected].chunks_exact(w.max(1)).enumerate() {
            let start = (y as usize + row) * stride + x as usize;
            self.pixels[start..start + w].copy_from_slice(src);
        }
        Ok(())
    }

    fn present(&mut self) -> Result<(), DisplayError> {
        if let Some(path) = &self.snapshot {
            self.write_snapshot(path)?;
        }
        Ok(())
    }
}

/// Expand an RGB565 value to 8-bit-per-channel RGB.
pub fn rgb565_to_rgb888(p: u16) -> [u8; 3] {
    let r = ((p >> 11) & 0x1f) as u8;
    let g = ((p >> 5) & 0x3f) as u8;
    let b = (p & 0x1f) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}
