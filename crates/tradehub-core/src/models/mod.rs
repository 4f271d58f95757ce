mod blob;
mod cache;
mod image;
pub mod youtube;

pub use blob::{BlobDocument, ChunkDocument, Dimensions};
pub use cache::CacheEntry;
pub use image::ImageMetadata;
