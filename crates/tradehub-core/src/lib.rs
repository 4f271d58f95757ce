//! TradeHub Core Library
//!
//! Domain models, the chunk codec, data URL handling, error types, configuration
//! and the PIX payload encoder shared by every TradeHub crate. Nothing in here
//! performs I/O.

pub mod codec;
pub mod config;
pub mod constants;
pub mod data_url;
pub mod error;
pub mod models;
pub mod pix;
pub mod storage_types;

// Re-export commonly used types
pub use codec::{decode_chunks, encode_chunks, estimate_chunk_count, expected_chunk_count};
pub use config::Config;
pub use data_url::DataUrl;
pub use error::{AppError, AppResult, ErrorMetadata, LogLevel};
pub use models::{BlobDocument, CacheEntry, ChunkDocument, Dimensions, ImageMetadata};
pub use pix::{crc16_ccitt_false, verify_pix_payload, PixPayload};
pub use storage_types::StorageBackend;
