//! TradeHub Services
//!
//! Orchestration on top of storage, processing and cache: resolving blob
//! references to full-image data URLs, and the product image lifecycle
//! (upload, removal, edit).

pub mod product_images;
pub mod resolver;
pub mod retry;

pub use product_images::{ProductImageService, UploadImage};
pub use resolver::ImageResolver;
pub use retry::RetryPolicy;
