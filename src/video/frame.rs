use crate::config::{self, ConfigError};

/// A single luminance frame whose width and height are multiples of the block size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Frame {
    /// Wrap row-major 8-bit luminance pixels. The dimensions must already be block aligned.
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, ConfigError> {
        if width % config::BLOCK_SIZE != 0 || height % config::BLOCK_SIZE != 0 {
            return Err(ConfigError::FrameNotAligned {
                width,
                height,
                block: config::BLOCK_SIZE,
            });
        }
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyFrame(config::BLOCK_SIZE));
        }
        if pixels.len() != width * height {
            return Err(ConfigError::PixelCountMismatch {
                expected: width * height,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Crop a `width x height` luminance image to the largest block-aligned
    /// region anchored at the top-left corner.
    pub fn crop_to_blocks(width: usize, height: usize, pixels: &[u8]) -> Result<Self, ConfigError> {
        if pixels.len() != width * height {
            return Err(ConfigError::PixelCountMismatch {
                expected: width * height,
                got: pixels.len(),
            });
        }
        let (out_w, out_h) = aligned_dimensions(width, height);
        let mut cropped = Vec::with_capacity(out_w * out_h);
        for row in pixels.chunks_exact(width.max(1)).take(out_h) {
            cropped.extend_from_slice(&row[..out_w]);
        }
        Self::new(out_w, out_h, cropped)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn blocks_x(&self) -> usize {
        self.width / config::BLOCK_SIZE
    }
}

/// Largest block-aligned dimensions that fit inside `width x height`.
pub fn aligned_dimensions(width: usize, height: usize) -> (usize, usize) {
    (
        width / config::BLOCK_SIZE * config::BLOCK_SIZE,
        height / config::BLOCK_SIZE * config::BLOCK_SIZE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unaligned() {
        assert!(matches!(
            Frame::new(10, 8, vec![0; 80]),
            Err(ConfigError::FrameNotAligned { .. })
        ));
        assert!(matches!(
            Frame::new(8, 8, vec![0; 63]),
            Err(ConfigError::PixelCountMismatch { expected: 64, got: 63 })
        ));
        assert!(matches!(Frame::new(0, 8, vec![]), Err(ConfigError::EmptyFrame(8))));
    }

    #[test]
    fn test_crop_to_blocks() {
        let width = 13;
        let height = 10;
        let pixels: Vec<u8> = (0..width * height).map(|i| i as u8).collect();
        let frame = Frame::crop_to_blocks(width, height, &pixels).unwrap();
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.height(), 8);
        assert_eq!(&frame.pixels()[..8], &pixels[..8]);
        assert_eq!(&frame.pixels()[8..16], &pixels[13..21]);
        assert_eq!(frame.blocks_x(), 1);
    }

    #[test]
    fn test_crop_too_small() {
        let pixels = vec![0u8; 7 * 20];
        assert!(matches!(
            Frame::crop_to_blocks(7, 20, &pixels),
            Err(ConfigError::EmptyFrame(_))
        ));
    }

    #[test]
    fn test_aligned_dimensions() {
        assert_eq!(aligned_dimensions(1920, 1080), (1920, 1080));
        assert_eq!(aligned_dimensions(642, 487), (640, 480));
    }
}
