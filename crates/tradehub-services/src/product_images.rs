//! Product image lifecycle: upload, YouTube links, removal and edits.
//!
//! A product keeps an ordered list of [`ImageMetadata`]. Image entries point at
//! a stored blob; removing an entry must delete that blob too so no reference
//! is left dangling.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tradehub_cache::ImageCache;
use tradehub_core::constants::FALLBACK_MIME_TYPE;
use tradehub_core::models::youtube::{extract_youtube_id, youtube_thumbnail_url};
use tradehub_core::{AppError, AppResult, Config, Dimensions, ImageMetadata};
use tradehub_processing::{probe, EncodedImage, ImageCompressor, ThumbnailGenerator};
use tradehub_storage::{BlobStore, StoreRequest};

/// A raw image uploaded by a seller.
#[derive(Debug, Clone)]
pub struct UploadImage {
    pub product_id: String,
    pub user_id: String,
    pub file_name: String,
    pub bytes: Bytes,
}

pub struct ProductImageService {
    blobs: BlobStore,
    cache: Arc<ImageCache>,
    compressor: ImageCompressor,
    thumbnails: ThumbnailGenerator,
}

struct Prepared {
    source_type: String,
    compressed: EncodedImage,
    thumbnail_data_url: String,
}

impl ProductImageService {
    pub fn new(blobs: BlobStore, cache: Arc<ImageCache>) -> Self {
        Self {
            blobs,
            cache,
            compressor: ImageCompressor::default(),
            thumbnails: ThumbnailGenerator::default(),
        }
    }

    pub fn from_config(blobs: BlobStore, cache: Arc<ImageCache>, config: &Config) -> Self {
        Self {
            blobs,
            cache,
            compressor: ImageCompressor::from_config(config),
            thumbnails: ThumbnailGenerator::from_config(config),
        }
    }

    pub fn with_compressor(mut self, compressor: ImageCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_thumbnails(mut self, thumbnails: ThumbnailGenerator) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    /// Compress and store an uploaded image, returning its product entry.
    pub async fn add_image(&self, upload: UploadImage) -> AppResult<ImageMetadata> {
        if upload.product_id.trim().is_empty() || upload.user_id.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "product and user ids are required".to_string(),
            ));
        }

        let source_size = upload.bytes.len() as u64;
        let compressor = self.compressor;
        let thumbnails = self.thumbnails;
        let data = upload.bytes.clone();

        let prepared = tokio::task::spawn_blocking(move || -> AppResult<Prepared> {
            let info = probe(&data)?;
            let compressed = compressor.compress(&data)?;
            let thumbnail = thumbnails.create_thumbnail_data_url(&data)?;
            Ok(Prepared {
                source_type: info.mime_type().unwrap_or(FALLBACK_MIME_TYPE).to_string(),
                compressed,
                thumbnail_data_url: thumbnail.to_string(),
            })
        })
        .await
        .map_err(|e| AppError::Internal(format!("Failed to process image: {}", e)))??;

        let compressed = prepared.compressed;
        let reference = self
            .blobs
            .store(StoreRequest {
                id: None,
                payload: STANDARD.encode(&compressed.bytes),
                mime_type: compressed.mime_type.to_string(),
                file_name: upload.file_name.clone(),
                source_type: prepared.source_type,
                size: Some(source_size),
                dimensions: Some(Dimensions {
                    width: compressed.width,
                    height: compressed.height,
                }),
                product_id: upload.product_id.clone(),
                user_id: upload.user_id,
            })
            .await?;

        tracing::info!(
            key = %reference,
            product_id = %upload.product_id,
            file_name = %upload.file_name,
            source_bytes = source_size,
            size_bytes = compressed.bytes.len(),
            "Product image added"
        );

        Ok(ImageMetadata::Image {
            thumbnail_data_url: prepared.thumbnail_data_url,
            full_image_ref: reference,
        })
    }

    /// Product entry for a YouTube link.
    pub fn add_video(&self, url: &str) -> AppResult<ImageMetadata> {
        let video_id = extract_youtube_id(url)
            .ok_or_else(|| AppError::InvalidInput(format!("not a YouTube URL: {}", url)))?;

        Ok(ImageMetadata::Video {
            thumbnail_data_url: youtube_thumbnail_url(&video_id),
            video_id,
            video_url: Some(url.to_string()),
        })
    }

    /// Delete the blob behind an entry and forget its cached data URL.
    /// Video entries own no blob.
    pub async fn remove_image(&self, entry: &ImageMetadata) -> AppResult<()> {
        let Some(reference) = entry.blob_reference() else {
            return Ok(());
        };

        let removed_chunks = self.blobs.delete(reference).await?;
        self.cache.invalidate(reference).await;

        tracing::info!(
            key = %reference,
            chunk_count = removed_chunks,
            "Product image removed"
        );
        Ok(())
    }

    /// Remove every entry of a deleted product.
    ///
    /// Keeps going past failures and returns the first error once every entry
    /// has been attempted.
    pub async fn remove_all(&self, entries: &[ImageMetadata]) -> AppResult<()> {
        let mut first_error = None;
        for entry in entries {
            if let Err(e) = self.remove_image(entry).await {
                tracing::error!(
                    key = entry.blob_reference().unwrap_or_default(),
                    error = %e,
                    "Failed to remove product image"
                );
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Edit flow: delete blobs referenced by `old` but no longer by `new`.
    pub async fn replace_images(
        &self,
        old: &[ImageMetadata],
        new: &[ImageMetadata],
    ) -> AppResult<()> {
        let kept: HashSet<&str> = new.iter().filter_map(ImageMetadata::blob_reference).collect();
        let dropped: Vec<ImageMetadata> = old
            .iter()
            .filter(|entry| {
                entry
                    .blob_reference()
                    .is_some_and(|reference| !kept.contains(reference))
            })
            .cloned()
            .collect();

        self.remove_all(&dropped).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradehub_cache::CacheConfig;
    use tradehub_storage::MemoryDocumentStore;

    fn service() -> ProductImageService {
        ProductImageService::new(
            BlobStore::new(Arc::new(MemoryDocumentStore::new())),
            Arc::new(ImageCache::in_memory(CacheConfig::default())),
        )
    }

    #[test]
    fn add_video_builds_thumbnail_url() {
        let entry = service()
            .add_video("https://youtu.be/dQw4w9WgXcQ")
            .unwrap();
        assert_eq!(
            entry,
            ImageMetadata::Video {
                thumbnail_data_url: "https://img.youtube.com/vi/dQw4w9WgXcQ/mqdefault.jpg"
                    .to_string(),
                video_id: "dQw4w9WgXcQ".to_string(),
                video_url: Some("https://youtu.be/dQw4w9WgXcQ".to_string()),
            }
        );
    }

    #[test]
    fn add_video_rejects_other_urls() {
        assert!(matches!(
            service().add_video("https://example.com/watch"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn removing_a_video_is_a_no_op() {
        let entry = service()
            .add_video("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .unwrap();
        service().remove_image(&entry).await.unwrap();
    }

    #[tokio::test]
    async fn add_image_rejects_undecodable_bytes() {
        let result = service()
            .add_image(UploadImage {
                product_id: "p".to_string(),
                user_id: "u".to_string(),
                file_name: "a.txt".to_string(),
                bytes: Bytes::from_static(b"plain text"),
            })
            .await;
        assert!(matches!(result, Err(AppError::Decode(_))));
    }
}
