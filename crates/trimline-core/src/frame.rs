//! Frame buffer types for decoded video frames in CPU memory.

use serde::{Deserialize, Serialize};

/// Pixel format of a decoded frame.
///
/// Only packed formats appear here: the decode pipe delivers packed RGB
/// and frames are cached exactly as decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bits per pixel)
    #[default]
    Rgb24,
    /// 8-bit RGBA (32 bits per pixel)
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// A decoded video frame in CPU memory.
///
/// The buffer owns its pixel data; `Clone` is a deep copy, so handing a
/// clone to a caller that mutates it never corrupts another holder's
/// copy.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    /// Pixel format
    pub format: PixelFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes per row (may include padding)
    pub stride: usize,
    /// Raw pixel data, `stride * height` bytes
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a zeroed frame buffer with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        // Align stride to 64 bytes for SIMD and GPU upload compatibility
        let min_stride = width as usize * format.bytes_per_pixel();
        let stride = (min_stride + 63) & !63;
        Self {
            format,
            width,
            height,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Wrap tightly packed pixel data (stride == width * bpp), as produced
    /// by a rawvideo pipe.
    pub fn from_packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            data,
        }
    }

    /// Get a row of pixel data (without any stride padding).
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        let end = start + self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..end]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + self.width as usize * self.format.bytes_per_pixel();
        &mut self.data[start..end]
    }

    /// Total memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let mut frame = Self::new(width, height, PixelFormat::Rgb24);
        let colors: [[u8; 3]; 8] = [
            [255, 255, 255], // White
            [255, 255, 0],   // Yellow
            [0, 255, 255],   // Cyan
            [0, 255, 0],     // Green
            [255, 0, 255],   // Magenta
            [255, 0, 0],     // Red
            [0, 0, 255],     // Blue
            [0, 0, 0],       // Black
        ];
        for y in 0..height {
            let row = frame.row_mut(y);
            for x in 0..width {
                let bar = (x * 8 / width) as usize;
                let i = x as usize * 3;
                row[i..i + 3].copy_from_slice(&colors[bar]);
            }
        }
        frame
    }
}

/// A decoded frame tagged with its zero-based index in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Zero-based position within the video's frame sequence
    pub index: u64,
    /// Pixel data
    pub buffer: FrameBuffer,
}

impl Frame {
    /// Create a new frame.
    pub fn new(index: u64, buffer: FrameBuffer) -> Self {
        Self { index, buffer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb24_frame_size() {
        let frame = FrameBuffer::new(1920, 1080, PixelFormat::Rgb24);
        assert!(frame.memory_size() >= 1920 * 1080 * 3);
    }

    #[test]
    fn test_packed_stride() {
        let data = vec![0u8; 64 * 48 * 3];
        let frame = FrameBuffer::from_packed(64, 48, PixelFormat::Rgb24, data);
        assert_eq!(frame.stride, 64 * 3);
        assert_eq!(frame.row(47).len(), 64 * 3);
    }

    #[test]
    fn test_test_pattern() {
        let frame = FrameBuffer::test_pattern(1920, 1080);
        assert_eq!(frame.width, 1920);
        assert_eq!(frame.height, 1080);

        // Check first pixel is white
        assert_eq!(frame.row(0)[0..3], [255, 255, 255]);
    }

    #[test]
    fn test_clone_is_deep() {
        let original = FrameBuffer::test_pattern(64, 48);
        let mut copy = original.clone();
        copy.row_mut(0)[0] = 0;
        assert_eq!(original.row(0)[0], 255);
    }
}
