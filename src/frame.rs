use crate::error::ScannerError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit luma, one byte per pixel
    Gray8,
    /// Packed RGB, three bytes per pixel
    Rgb24,
    /// Packed RGBA, four bytes per pixel
    Rgba,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Gray8 => 1,
            FrameFormat::Rgb24 => 3,
            FrameFormat::Rgba => 4,
        }
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Get the expected frame size in bytes
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Luma buffer handed to the decoder.
///
/// The buffer is reused across decode attempts and resized to whatever
/// dimensions the current frame reports, since a stream may renegotiate its
/// resolution after it opens.
#[derive(Debug, Default, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    luma: Vec<u8>,
}

impl PixelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `frame` into the buffer as luma, resizing to its native dimensions
    pub fn load(&mut self, frame: &FrameData) -> Result<(), ScannerError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(ScannerError::Decode {
                details: format!("frame {} has no pixels", frame.id),
            });
        }

        if !frame.validate_size() {
            return Err(ScannerError::Decode {
                details: format!(
                    "frame {} is {} bytes, expected {} for {}x{} {:?}",
                    frame.id,
                    frame.data.len(),
                    frame.expected_size(),
                    frame.width,
                    frame.height,
                    frame.format
                ),
            });
        }

        self.width = frame.width;
        self.height = frame.height;
        self.luma.clear();

        match frame.format {
            FrameFormat::Gray8 => self.luma.extend_from_slice(&frame.data),
            FrameFormat::Rgb24 | FrameFormat::Rgba => {
                let bpp = frame.format.bytes_per_pixel();
                self.luma.extend(
                    frame
                        .data
                        .chunks_exact(bpp)
                        .map(|px| luma_from_rgb(px[0], px[1], px[2])),
                );
            }
        }

        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn luma(&self) -> &[u8] {
        &self.luma
    }

    pub fn is_empty(&self) -> bool {
        self.luma.is_empty()
    }

    /// Luma value at (x, y); out-of-range coordinates read as white
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.luma
            .get(y * self.width as usize + x)
            .copied()
            .unwrap_or(u8::MAX)
    }
}

// ITU-R BT.601 weights in 8-bit fixed point
fn luma_from_rgb(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> FrameData {
        FrameData::new(1, SystemTime::now(), data, width, height, format)
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(FrameFormat::Gray8.bytes_per_pixel(), 1);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(FrameFormat::Rgba.bytes_per_pixel(), 4);
    }

    #[test]
    fn test_frame_size_validation() {
        assert!(frame(vec![0; 12], 2, 2, FrameFormat::Rgb24).validate_size());
        assert!(!frame(vec![0; 11], 2, 2, FrameFormat::Rgb24).validate_size());
    }

    #[test]
    fn test_buffer_resizes_to_each_frame() {
        let mut buffer = PixelBuffer::new();

        buffer.load(&frame(vec![10; 4], 2, 2, FrameFormat::Gray8)).unwrap();
        assert_eq!(buffer.dimensions(), (2, 2));
        assert_eq!(buffer.luma().len(), 4);

        buffer.load(&frame(vec![20; 12], 4, 3, FrameFormat::Gray8)).unwrap();
        assert_eq!(buffer.dimensions(), (4, 3));
        assert_eq!(buffer.luma().len(), 12);
        assert!(buffer.luma().iter().all(|&v| v == 20));
    }

    #[test]
    fn test_rgba_is_converted_to_luma() {
        let mut buffer = PixelBuffer::new();
        let data = vec![255, 255, 255, 255, 0, 0, 0, 255];

        buffer.load(&frame(data, 2, 1, FrameFormat::Rgba)).unwrap();

        assert_eq!(buffer.pixel(0, 0), 255);
        assert_eq!(buffer.pixel(1, 0), 0);
        assert_eq!(buffer.pixel(5, 5), u8::MAX);
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let mut buffer = PixelBuffer::new();
        let result = buffer.load(&frame(vec![0; 5], 2, 2, FrameFormat::Rgb24));

        assert!(matches!(result, Err(ScannerError::Decode { .. })));
    }
}
