use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use tradehub_core::{AppError, AppResult, DataUrl};

pub(crate) const JPEG_MIME_TYPE: &str = "image/jpeg";

/// Output of a processing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

impl EncodedImage {
    pub fn to_data_url(&self) -> DataUrl {
        DataUrl::from_bytes(self.mime_type, &self.bytes)
    }
}

pub(crate) fn decode(data: &[u8]) -> AppResult<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::Decode(format!("Failed to read image: {}", e)))?;
    reader
        .decode()
        .map_err(|e| AppError::Decode(format!("Failed to decode image: {}", e)))
}

/// Composite onto an opaque white background; JPEG has no alpha channel.
pub(crate) fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let pixel = rgba.get_pixel(x, y);
        let alpha = pixel[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])])
    })
}

pub(crate) fn encode_jpeg(img: &DynamicImage, quality: u8) -> AppResult<EncodedImage> {
    let rgb = flatten_onto_white(img);
    let (width, height) = rgb.dimensions();

    let mut buffer = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        encoder
            .encode_image(&rgb)
            .map_err(|e| AppError::ImageProcessing(format!("JPEG encoding failed: {}", e)))?;
    }

    Ok(EncodedImage {
        bytes: Bytes::from(buffer),
        width,
        height,
        mime_type: JPEG_MIME_TYPE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn transparent_pixels_become_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let rgb = flatten_onto_white(&img);
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn opaque_pixels_are_kept() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255])));
        let rgb = flatten_onto_white(&img);
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn half_transparent_black_is_mid_grey() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        let rgb = flatten_onto_white(&img);
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([127, 127, 127]));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode(b"definitely not an image"), Err(AppError::Decode(_))));
    }
}
