//! TradeHub Processing Library
//!
//! Image work done before a product image is stored: probing, compression of
//! the full image and thumbnail generation. Every output is JPEG.

pub mod compression;
mod encode;
pub mod metadata;
pub mod thumbnail;

pub use compression::ImageCompressor;
pub use encode::EncodedImage;
pub use metadata::{probe, ImageInfo};
pub use thumbnail::{fit_within, ThumbnailGenerator};
