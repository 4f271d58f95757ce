//! Document store abstraction
//!
//! This module defines the DocumentStore trait that all document backends must
//! implement. Documents are JSON values addressed by slash-separated paths.

use crate::StorageBackend;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tradehub_core::AppError;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => AppError::NotFound(path),
            StorageError::InvalidPath(msg) => AppError::InvalidInput(msg),
            StorageError::Serialization(e) => AppError::Decode(e.to_string()),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// One operation of a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set { path: String, value: Value },
    Delete { path: String },
}

impl WriteOp {
    pub fn path(&self) -> &str {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Delete { path } => path,
        }
    }
}

/// Group of writes committed all-or-nothing by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, value: Value) -> &mut Self {
        self.ops.push(WriteOp::Set {
            path: path.into(),
            value,
        });
        self
    }

    pub fn delete(&mut self, path: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { path: path.into() });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Document store abstraction trait
///
/// All backends (in-memory, local filesystem) implement this trait so the blob
/// layer can work against any of them.
///
/// **Path format:** see the crate root documentation. Every method validates its
/// path and returns [`StorageError::InvalidPath`] for malformed ones.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` when it does not exist
    async fn get(&self, path: &str) -> StorageResult<Option<Value>>;

    /// Create or overwrite a document
    async fn set(&self, path: &str, value: Value) -> StorageResult<()>;

    /// Delete a document. Deleting an absent document succeeds.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Ids of the documents directly inside a collection, sorted
    async fn list(&self, collection: &str) -> StorageResult<Vec<String>>;

    /// Apply every operation of the batch, or none of them
    async fn commit(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Get the backend type
    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_keeps_operation_order() {
        let mut batch = WriteBatch::new();
        batch
            .set("c/a", json!({"data": "x"}))
            .delete("c/b")
            .set("c/c", json!(1));

        let paths: Vec<&str> = batch.ops().iter().map(WriteOp::path).collect();
        assert_eq!(paths, vec!["c/a", "c/b", "c/c"]);
        assert_eq!(batch.len(), 3);
        assert!(WriteBatch::new().is_empty());
    }

    #[test]
    fn storage_errors_map_to_app_errors() {
        assert!(matches!(
            AppError::from(StorageError::NotFound("c/a".into())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(StorageError::InvalidPath("..".into())),
            AppError::InvalidInput(_)
        ));
        assert!(matches!(
            AppError::from(StorageError::BackendError("down".into())),
            AppError::Storage(_)
        ));
    }
}
