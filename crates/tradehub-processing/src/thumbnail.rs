//! Thumbnails embedded in product documents as data URLs.

use image::imageops::FilterType;
use tradehub_core::constants::{DEFAULT_THUMBNAIL_MAX_DIMENSION, DEFAULT_THUMBNAIL_QUALITY};
use tradehub_core::{AppError, AppResult, Config, DataUrl};

use crate::encode::{decode, encode_jpeg, EncodedImage};

/// Size that fits inside a `max` x `max` box with the aspect ratio kept.
///
/// Images already inside the box are returned unchanged (never upscaled).
/// Otherwise the larger side becomes `max` and the other side is rounded, with
/// a minimum of one pixel.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width.max(height) <= max {
        return (width, height);
    }

    let scale = |side: u32, larger: u32| -> u32 {
        let scaled = (side as f64 * max as f64 / larger as f64).round() as u32;
        scaled.max(1)
    };

    if width >= height {
        (max, scale(height, width))
    } else {
        (scale(width, height), max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailGenerator {
    pub max_dimension: u32,
    pub quality: u8,
}

impl Default for ThumbnailGenerator {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_THUMBNAIL_MAX_DIMENSION,
            quality: DEFAULT_THUMBNAIL_QUALITY,
        }
    }
}

impl ThumbnailGenerator {
    pub fn new(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension,
            quality,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.thumbnail_max_dimension, config.thumbnail_quality)
    }

    /// Decode, shrink to fit `max_dimension` and re-encode as JPEG.
    pub fn create_thumbnail(&self, data: &[u8]) -> AppResult<EncodedImage> {
        if self.max_dimension == 0 {
            return Err(AppError::InvalidInput(
                "thumbnail dimension must be greater than 0".to_string(),
            ));
        }

        let img = decode(data)?;
        let (source_width, source_height) = (img.width(), img.height());
        let (width, height) = fit_within(source_width, source_height, self.max_dimension);

        let img = if (width, height) == (source_width, source_height) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Triangle)
        };

        let encoded = encode_jpeg(&img, self.quality)?;

        tracing::debug!(
            source_width = source_width,
            source_height = source_height,
            width = encoded.width,
            height = encoded.height,
            size_bytes = encoded.bytes.len(),
            "Thumbnail created"
        );

        Ok(encoded)
    }

    pub fn create_thumbnail_data_url(&self, data: &[u8]) -> AppResult<DataUrl> {
        Ok(self.create_thumbnail(data)?.to_data_url())
    }
}
