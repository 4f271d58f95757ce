//! Image probing

use image::{GenericImageView, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tradehub_core::{AppError, AppResult, Dimensions};

/// Basic facts about an uploaded image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size_bytes: u64,
}

impl ImageInfo {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// MIME type of the detected format, when it has one
    pub fn mime_type(&self) -> Option<&'static str> {
        match self.format.as_str() {
            "Jpeg" => Some("image/jpeg"),
            "Png" => Some("image/png"),
            "WebP" => Some("image/webp"),
            "Gif" => Some("image/gif"),
            _ => None,
        }
    }
}

/// Decode an image and report its format and dimensions.
pub fn probe(data: &[u8]) -> AppResult<ImageInfo> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::Decode(format!("Failed to read image: {}", e)))?;
    let format = reader
        .format()
        .map(|f| format!("{:?}", f))
        .unwrap_or_else(|| "unknown".to_string());
    let img = reader
        .decode()
        .map_err(|e| AppError::Decode(format!("Failed to decode image: {}", e)))?;

    let (width, height) = img.dimensions();

    Ok(ImageInfo {
        width,
        height,
        format,
        size_bytes: data.len() as u64,
    })
}
