use super::types::{DecodeOptions, DecodeResult};
use crate::error::ScannerError;
use crate::frame::PixelBuffer;
use tracing::trace;

/// Turns a luma buffer into at most one QR payload
pub trait FrameDecoder: Send {
    /// Run one decode pass over `buffer`.
    ///
    /// `Err` means this attempt failed (corrupt frame, undecodable grid);
    /// the caller decides whether that matters.
    fn decode(
        &mut self,
        buffer: &PixelBuffer,
        options: &DecodeOptions,
    ) -> Result<DecodeResult, ScannerError>;
}

/// QR decoder backed by `rqrr`
#[derive(Debug, Default)]
pub struct QrDecoder;

impl QrDecoder {
    pub fn new() -> Self {
        Self
    }

    fn decode_pass(buffer: &PixelBuffer, inverted: bool) -> Result<DecodeResult, ScannerError> {
        let width = buffer.width() as usize;
        let height = buffer.height() as usize;

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
            let value = buffer.pixel(x, y);
            if inverted {
                u8::MAX - value
            } else {
                value
            }
        });

        let grids = prepared.detect_grids();
        trace!(
            "Detected {} candidate grids (inverted: {})",
            grids.len(),
            inverted
        );

        let mut last_error = None;
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => return Ok(DecodeResult::Found(content)),
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) => Err(ScannerError::Decode {
                details: e.to_string(),
            }),
            None => Ok(DecodeResult::NotFound),
        }
    }
}

impl FrameDecoder for QrDecoder {
    fn decode(
        &mut self,
        buffer: &PixelBuffer,
        options: &DecodeOptions,
    ) -> Result<DecodeResult, ScannerError> {
        if buffer.is_empty() {
            return Err(ScannerError::Decode {
                details: "empty pixel buffer".to_string(),
            });
        }

        let mut failure = None;
        for &inverted in options.inversion.passes() {
            match Self::decode_pass(buffer, inverted) {
                Ok(DecodeResult::Found(payload)) => return Ok(DecodeResult::Found(payload)),
                Ok(DecodeResult::NotFound) => {}
                Err(e) => failure = Some(e),
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(DecodeResult::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameData, FrameFormat};
    use crate::scanner::InversionMode;
    use std::time::SystemTime;

    fn buffer_of(value: u8, width: u32, height: u32) -> PixelBuffer {
        let frame = FrameData::new(
            0,
            SystemTime::now(),
            vec![value; (width * height) as usize],
            width,
            height,
            FrameFormat::Gray8,
        );
        let mut buffer = PixelBuffer::new();
        buffer.load(&frame).unwrap();
        buffer
    }

    fn rendered_code(payload: &str, inverted: bool) -> PixelBuffer {
        const MODULE_PX: usize = 8;
        const QUIET_ZONE: usize = 4;

        let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width();
        let colors = code.to_colors();
        let side = (modules + 2 * QUIET_ZONE) * MODULE_PX;

        let (dark, light) = if inverted { (255, 0) } else { (0, 255) };
        let mut pixels = vec![light; side * side];
        for y in 0..side {
            for x in 0..side {
                let mx = (x / MODULE_PX).checked_sub(QUIET_ZONE);
                let my = (y / MODULE_PX).checked_sub(QUIET_ZONE);
                if let (Some(mx), Some(my)) = (mx, my) {
                    if mx < modules
                        && my < modules
                        && colors[my * modules + mx] == qrcode::Color::Dark
                    {
                        pixels[y * side + x] = dark;
                    }
                }
            }
        }

        let frame = FrameData::new(
            0,
            SystemTime::now(),
            pixels,
            side as u32,
            side as u32,
            FrameFormat::Gray8,
        );
        let mut buffer = PixelBuffer::new();
        buffer.load(&frame).unwrap();
        buffer
    }

    fn options(inversion: InversionMode) -> DecodeOptions {
        DecodeOptions { inversion }
    }

    #[test]
    fn test_decodes_printed_badge() {
        let mut decoder = QrDecoder::new();
        let buffer = rendered_code("12", false);

        let result = decoder
            .decode(&buffer, &options(InversionMode::DontInvert))
            .unwrap();
        assert_eq!(result, DecodeResult::Found("12".to_string()));
    }

    #[test]
    fn test_inverted_code_needs_inversion_pass() {
        let mut decoder = QrDecoder::new();
        let buffer = rendered_code("12", true);

        let plain = decoder
            .decode(&buffer, &options(InversionMode::DontInvert))
            .unwrap();
        assert_eq!(plain, DecodeResult::NotFound);

        let both = decoder
            .decode(&buffer, &options(InversionMode::AttemptBoth))
            .unwrap();
        assert_eq!(both, DecodeResult::Found("12".to_string()));

        let only = decoder
            .decode(&buffer, &options(InversionMode::OnlyInvert))
            .unwrap();
        assert_eq!(only, DecodeResult::Found("12".to_string()));
    }

    #[test]
    fn test_blank_frame_has_no_code() {
        let mut decoder = QrDecoder::new();
        let buffer = buffer_of(255, 64, 48);

        let result = decoder.decode(&buffer, &DecodeOptions::default()).unwrap();
        assert_eq!(result, DecodeResult::NotFound);
    }

    #[test]
    fn test_blank_frame_inverted_has_no_code() {
        let mut decoder = QrDecoder::new();
        let buffer = buffer_of(0, 64, 48);
        let options = DecodeOptions {
            inversion: InversionMode::AttemptBoth,
        };

        let result = decoder.decode(&buffer, &options).unwrap();
        assert_eq!(result, DecodeResult::NotFound);
    }

    #[test]
    fn test_empty_buffer_is_a_decode_error() {
        let mut decoder = QrDecoder::new();

        let result = decoder.decode(&PixelBuffer::new(), &DecodeOptions::default());
        assert!(matches!(result, Err(ScannerError::Decode { .. })));
    }

    #[test]
    fn test_inversion_passes() {
        assert_eq!(InversionMode::DontInvert.passes(), &[false]);
        assert_eq!(InversionMode::OnlyInvert.passes(), &[true]);
        assert_eq!(InversionMode::AttemptBoth.passes(), &[false, true]);
        assert_eq!(InversionMode::InvertFirst.passes(), &[true, false]);
    }
}
