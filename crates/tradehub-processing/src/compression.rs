//! Pre-upload compression of full product images.

use image::imageops::FilterType;
use tradehub_core::constants::{DEFAULT_UPLOAD_MAX_WIDTH, DEFAULT_UPLOAD_QUALITY};
use tradehub_core::{AppResult, Config};

use crate::encode::{decode, encode_jpeg, EncodedImage};

/// Scales images down to `max_width` (aspect ratio kept) and re-encodes as JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCompressor {
    pub max_width: u32,
    pub quality: u8,
}

impl Default for ImageCompressor {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_UPLOAD_MAX_WIDTH,
            quality: DEFAULT_UPLOAD_QUALITY,
        }
    }
}

impl ImageCompressor {
    pub fn new(max_width: u32, quality: u8) -> Self {
        Self { max_width, quality }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.upload_max_width, config.upload_quality)
    }

    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.max_width || self.max_width == 0 {
            return (width, height);
        }
        let scaled = (height as f64 * self.max_width as f64 / width as f64).round() as u32;
        (self.max_width, scaled.max(1))
    }

    pub fn compress(&self, data: &[u8]) -> AppResult<EncodedImage> {
        let img = decode(data)?;
        let (source_width, source_height) = (img.width(), img.height());
        let (width, height) = self.target_size(source_width, source_height);

        let img = if (width, height) == (source_width, source_height) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Lanczos3)
        };

        let encoded = encode_jpeg(&img, self.quality)?;

        tracing::debug!(
            source_width = source_width,
            source_height = source_height,
            width = encoded.width,
            height = encoded.height,
            source_bytes = data.len(),
            size_bytes = encoded.bytes.len(),
            "Image compressed"
        );

        Ok(encoded)
    }
}
