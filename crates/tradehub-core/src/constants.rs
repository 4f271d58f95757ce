//! Application-wide constants.

/// Collection holding full-image blob metadata documents.
pub const PRODUCT_IMAGES_COLLECTION: &str = "products-images";

/// Subcollection (under a blob metadata document) holding the payload chunks.
pub const CHUNKS_SUBCOLLECTION: &str = "chunks";

/// Chunk documents are named `chunk0 .. chunk{N-1}`.
pub const CHUNK_DOCUMENT_PREFIX: &str = "chunk";

pub const DEFAULT_CHUNK_SIZE: usize = 4000;
pub const DEFAULT_CHUNK_FETCH_CONCURRENCY: usize = 4;

/// 50 MiB
pub const DEFAULT_CACHE_CAPACITY_BYTES: u64 = 50 * 1024 * 1024;
/// 7 days
pub const DEFAULT_CACHE_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

pub const DEFAULT_THUMBNAIL_MAX_DIMENSION: u32 = 200;
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 70;
pub const DEFAULT_UPLOAD_MAX_WIDTH: u32 = 1920;
pub const DEFAULT_UPLOAD_QUALITY: u8 = 80;

pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_FETCH_BACKOFF_MS: u64 = 1000;

/// MIME type assumed when a blob document carries none.
pub const FALLBACK_MIME_TYPE: &str = "image/jpeg";

pub const YOUTUBE_THUMBNAIL_BASE_URL: &str = "https://img.youtube.com/vi";
