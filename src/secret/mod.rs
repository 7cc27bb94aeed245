//! The hidden image: 8-bit grayscale pixels plus dimensions.

use std::path::Path;

use image::GrayImage;
use log::info;
use thiserror::Error;

use crate::config;

#[derive(Error, Debug)]
pub enum SecretImageError {
    #[error("image codec: {0}")]
    Codec(#[from] image::ImageError),
    #[error("image {width}x{height} exceeds the {bits}-bit dimension fields")]
    TooLarge { width: u32, height: u32, bits: usize },
    #[error("{width}x{height} image needs {expected} pixels, got {got}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SecretImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, SecretImageError> {
        let limit = 1u32 << config::DIMENSION_BITS;
        if width >= limit || height >= limit {
            return Err(SecretImageError::TooLarge {
                width,
                height,
                bits: config::DIMENSION_BITS,
            });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(SecretImageError::DimensionMismatch {
                width,
                height,
                expected,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Load any supported image file and convert it to 8-bit luminance.
    pub fn load(path: &Path) -> Result<Self, SecretImageError> {
        let gray = image::open(path)?.to_luma8();
        let (width, height) = gray.dimensions();
        info!(
            "loaded secret image {} ({}x{}, {} bytes)",
            path.display(),
            width,
            height,
            width as usize * height as usize
        );
        Self::new(width, height, gray.into_raw())
    }

    /// Save as an 8-bit grayscale image; the format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<(), SecretImageError> {
        let img = GrayImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or(
            SecretImageError::DimensionMismatch {
                width: self.width,
                height: self.height,
                expected: self.width as usize * self.height as usize,
                got: self.pixels.len(),
            },
        )?;
        img.save(path)?;
        info!("saved recovered image: {}", path.display());
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_checks() {
        assert!(SecretImage::new(4, 2, vec![0; 8]).is_ok());
        assert!(matches!(
            SecretImage::new(4, 2, vec![0; 7]),
            Err(SecretImageError::DimensionMismatch { expected: 8, got: 7, .. })
        ));
        assert!(matches!(
            SecretImage::new(65536, 1, vec![]),
            Err(SecretImageError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_png_roundtrip() {
        let dir = std::env::temp_dir().join("qimsteg_test_secret_png");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("secret.png");

        let pixels: Vec<u8> = (0..50 * 30).map(|i| ((i % 50) + (i / 50)) as u8).collect();
        let img = SecretImage::new(50, 30, pixels).unwrap();
        img.save(&path).unwrap();

        let loaded = SecretImage::load(&path).unwrap();
        assert_eq!(loaded, img);

        std::fs::remove_dir_all(&dir).ok();
    }
}
