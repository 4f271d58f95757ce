//! Shared path construction for document stores.
//!
//! Blob metadata lives at `products-images/{id}`; its chunks at
//! `products-images/{id}/chunks/chunk{i}`. All backends and the blob layer must
//! use these helpers for consistency.

use crate::traits::{StorageError, StorageResult};
use tradehub_core::constants::{
    CHUNKS_SUBCOLLECTION, CHUNK_DOCUMENT_PREFIX, PRODUCT_IMAGES_COLLECTION,
};
use uuid::Uuid;

/// Split a path into segments, rejecting traversal and empty segments.
pub fn validate_path(path: &str) -> StorageResult<Vec<&str>> {
    if path.is_empty() {
        return Err(StorageError::InvalidPath("path is empty".to_string()));
    }
    if path.starts_with('/') {
        return Err(StorageError::InvalidPath(format!(
            "path must be relative: {}",
            path
        )));
    }

    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments {
        if segment.is_empty() {
            return Err(StorageError::InvalidPath(format!(
                "path has an empty segment: {}",
                path
            )));
        }
        if *segment == "." || segment.contains("..") || segment.contains('\\') {
            return Err(StorageError::InvalidPath(format!(
                "path contains invalid characters: {}",
                path
            )));
        }
    }
    Ok(segments)
}

/// A document path has an even number of segments (collection/id pairs).
pub fn validate_document_path(path: &str) -> StorageResult<()> {
    let segments = validate_path(path)?;
    if segments.len() % 2 != 0 {
        return Err(StorageError::InvalidPath(format!(
            "not a document path: {}",
            path
        )));
    }
    Ok(())
}

/// A collection path has an odd number of segments.
pub fn validate_collection_path(path: &str) -> StorageResult<()> {
    let segments = validate_path(path)?;
    if segments.len() % 2 == 0 {
        return Err(StorageError::InvalidPath(format!(
            "not a collection path: {}",
            path
        )));
    }
    Ok(())
}

/// `products-images/{id}`
pub fn blob_reference(id: &str) -> String {
    format!("{}/{}", PRODUCT_IMAGES_COLLECTION, id)
}

/// Allocate a reference for a new blob.
pub fn new_blob_reference() -> String {
    blob_reference(&Uuid::new_v4().simple().to_string())
}

/// Check that a reference names a document of the `products-images` collection.
pub fn validate_blob_reference(reference: &str) -> StorageResult<()> {
    let segments = validate_path(reference)?;
    if segments.len() != 2 || segments[0] != PRODUCT_IMAGES_COLLECTION {
        return Err(StorageError::InvalidPath(format!(
            "not a blob reference: {}",
            reference
        )));
    }
    Ok(())
}

/// `{reference}/chunks`
pub fn chunk_collection(reference: &str) -> String {
    format!("{}/{}", reference, CHUNKS_SUBCOLLECTION)
}

/// `{reference}/chunks/chunk{index}`
pub fn chunk_path(reference: &str, index: usize) -> String {
    format!(
        "{}/{}{}",
        chunk_collection(reference),
        CHUNK_DOCUMENT_PREFIX,
        index
    )
}

/// Index of a chunk document id (`chunk7` -> 7).
pub fn parse_chunk_index(document_id: &str) -> Option<usize> {
    let digits = document_id.strip_prefix(CHUNK_DOCUMENT_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
