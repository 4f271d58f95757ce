//! Chunked blob storage on top of a [`DocumentStore`].
//!
//! A blob is one metadata document plus `chunkCount` chunk documents holding
//! consecutive slices of the base64 payload. Chunks are committed first as a
//! single batch and the metadata document last, so a reader that finds the
//! metadata can rely on every chunk being present.

use crate::keys::{
    blob_reference, chunk_collection, chunk_path, new_blob_reference, parse_chunk_index,
    validate_blob_reference,
};
use crate::traits::{DocumentStore, WriteBatch};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tradehub_core::constants::{DEFAULT_CHUNK_FETCH_CONCURRENCY, DEFAULT_CHUNK_SIZE};
use tradehub_core::data_url::is_base64_text;
use tradehub_core::{
    decode_chunks, encode_chunks, AppError, AppResult, BlobDocument, ChunkDocument, Config,
    DataUrl, Dimensions,
};

/// Everything needed to persist one image.
#[derive(Debug, Clone, Default)]
pub struct StoreRequest {
    /// Document id inside `products-images`; a fresh one is allocated when `None`.
    pub id: Option<String>,
    /// Base64 payload (no `data:` prefix).
    pub payload: String,
    pub mime_type: String,
    pub file_name: String,
    /// MIME type of the original upload
    pub source_type: String,
    /// Original upload size in bytes
    pub size: Option<u64>,
    pub dimensions: Option<Dimensions>,
    pub product_id: String,
    pub user_id: String,
}

/// A reassembled blob.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBlob {
    pub mime_type: String,
    pub payload: String,
    pub metadata: BlobDocument,
}

impl FetchedBlob {
    pub fn into_data_url(self) -> DataUrl {
        DataUrl::new(self.mime_type, self.payload)
    }
}

#[derive(Clone)]
pub struct BlobStore {
    documents: Arc<dyn DocumentStore>,
    chunk_size: usize,
    fetch_concurrency: usize,
}

impl BlobStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            chunk_size: DEFAULT_CHUNK_SIZE,
            fetch_concurrency: DEFAULT_CHUNK_FETCH_CONCURRENCY,
        }
    }

    pub fn from_config(documents: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self::new(documents)
            .with_chunk_size(config.chunk_size)
            .with_fetch_concurrency(config.chunk_fetch_concurrency)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Chunk reads kept in flight per fetch (at least one).
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Persist a blob and return its reference (`products-images/{id}`).
    ///
    /// If the metadata write fails, the chunks already committed are deleted
    /// again and the original error is returned.
    pub async fn store(&self, request: StoreRequest) -> AppResult<String> {
        if request.payload.is_empty() {
            return Err(AppError::InvalidInput("image payload is empty".to_string()));
        }
        if !is_base64_text(&request.payload) {
            return Err(AppError::InvalidInput(
                "image payload is not base64 text".to_string(),
            ));
        }
        if request.mime_type.trim().is_empty() {
            return Err(AppError::InvalidInput("MIME type is required".to_string()));
        }

        let reference = match &request.id {
            Some(id) => blob_reference(id),
            None => new_blob_reference(),
        };
        validate_blob_reference(&reference)?;

        let chunks = encode_chunks(&request.payload, self.chunk_size)?;
        let chunk_count = chunks.len();
        let start = std::time::Instant::now();

        let mut batch = WriteBatch::new();
        for (index, data) in chunks.into_iter().enumerate() {
            batch.set(
                chunk_path(&reference, index),
                serde_json::to_value(ChunkDocument { data })?,
            );
        }
        self.documents.commit(batch).await?;

        let metadata = BlobDocument {
            file_name: request.file_name,
            mime_type: request.mime_type,
            source_type: request.source_type,
            size: request.size,
            chunk_count,
            chunk_size: self.chunk_size,
            dimensions: request.dimensions,
            created_at: Utc::now(),
            product_id: request.product_id,
            user_id: request.user_id,
        };

        let written = match serde_json::to_value(&metadata) {
            Ok(value) => self.documents.set(&reference, value).await.map_err(AppError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            tracing::warn!(
                key = %reference,
                chunk_count = chunk_count,
                error = %e,
                "Blob metadata write failed, removing chunks"
            );
            self.remove_chunks(&reference, chunk_count).await;
            return Err(e);
        }

        tracing::info!(
            key = %reference,
            chunk_count = chunk_count,
            size_bytes = request.payload.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob stored"
        );

        Ok(reference)
    }

    async fn remove_chunks(&self, reference: &str, chunk_count: usize) {
        let mut batch = WriteBatch::new();
        for index in 0..chunk_count {
            batch.delete(chunk_path(reference, index));
        }
        if let Err(e) = self.documents.commit(batch).await {
            tracing::error!(
                key = %reference,
                chunk_count = chunk_count,
                error = %e,
                "Failed to remove chunks of an incomplete blob"
            );
        }
    }

    /// Read the metadata and every chunk, then reassemble the payload.
    pub async fn fetch(&self, reference: &str) -> AppResult<FetchedBlob> {
        validate_blob_reference(reference)?;
        let start = std::time::Instant::now();

        let value = self
            .documents
            .get(reference)
            .await?
            .ok_or_else(|| AppError::NotFound(reference.to_string()))?;
        let metadata: BlobDocument = serde_json::from_value(value)?;

        let chunk_count = metadata.chunk_count;
        if chunk_count == 0 {
            return Err(corrupt(reference, 0, "blob has no chunks"));
        }

        // Chunks are checked against the size the blob was written with
        let chunk_size = metadata.chunk_size;
        if chunk_size == 0 {
            return Err(corrupt(reference, 0, "blob has a chunk size of 0"));
        }

        let chunks: Vec<String> = stream::iter(0..chunk_count)
            .map(|index| self.fetch_chunk(reference, index, chunk_count, chunk_size))
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await?;

        let payload = decode_chunks(&chunks);

        tracing::info!(
            key = %reference,
            chunk_count = chunk_count,
            size_bytes = payload.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob fetched"
        );

        Ok(FetchedBlob {
            mime_type: metadata.mime_type.clone(),
            payload,
            metadata,
        })
    }

    async fn fetch_chunk(
        &self,
        reference: &str,
        index: usize,
        chunk_count: usize,
        chunk_size: usize,
    ) -> AppResult<String> {
        let value = self
            .documents
            .get(&chunk_path(reference, index))
            .await?
            .ok_or_else(|| corrupt(reference, index, "chunk is missing"))?;

        let ChunkDocument { data } = serde_json::from_value(value)
            .map_err(|e| corrupt(reference, index, &format!("malformed chunk document: {}", e)))?;

        let is_last = index + 1 == chunk_count;
        if data.is_empty() {
            return Err(corrupt(reference, index, "chunk is empty"));
        }
        if !is_last && data.len() != chunk_size {
            return Err(corrupt(
                reference,
                index,
                &format!(
                    "chunk has {} characters, expected {}",
                    data.len(),
                    chunk_size
                ),
            ));
        }
        if is_last && data.len() > chunk_size {
            return Err(corrupt(
                reference,
                index,
                &format!(
                    "final chunk has {} characters, more than {}",
                    data.len(),
                    chunk_size
                ),
            ));
        }
        if !is_base64_text(&data) {
            return Err(corrupt(reference, index, "chunk is not base64 text"));
        }

        Ok(data)
    }

    pub async fn fetch_data_url(&self, reference: &str) -> AppResult<DataUrl> {
        Ok(self.fetch(reference).await?.into_data_url())
    }

    pub async fn exists(&self, reference: &str) -> AppResult<bool> {
        validate_blob_reference(reference)?;
        Ok(self.documents.get(reference).await?.is_some())
    }

    /// Delete every chunk in index order, then the metadata document.
    ///
    /// Returns the number of chunk documents removed. An empty chunk collection
    /// or an already deleted metadata document is not an error.
    pub async fn delete(&self, reference: &str) -> AppResult<usize> {
        validate_blob_reference(reference)?;
        let start = std::time::Instant::now();

        let collection = chunk_collection(reference);
        let mut chunk_ids: Vec<(Option<usize>, String)> = self
            .documents
            .list(&collection)
            .await?
            .into_iter()
            .map(|id| (parse_chunk_index(&id), id))
            .collect();
        // Indexed chunks first in numeric order, stray documents after them
        chunk_ids.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.1.cmp(&b.1),
        });

        for (_, id) in &chunk_ids {
            self.documents
                .delete(&format!("{}/{}", collection, id))
                .await?;
        }
        self.documents.delete(reference).await?;

        tracing::info!(
            key = %reference,
            chunk_count = chunk_ids.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Blob deleted"
        );

        Ok(chunk_ids.len())
    }
}

fn corrupt(reference: &str, index: usize, reason: &str) -> AppError {
    AppError::CorruptChunk {
        reference: reference.to_string(),
        index,
        reason: reason.to_string(),
    }
}
