#[cfg(feature = "storage-local")]
use crate::LocalDocumentStore;
use crate::{DocumentStore, MemoryDocumentStore, StorageBackend, StorageResult};
#[cfg(not(feature = "storage-local"))]
use crate::StorageError;
use std::sync::Arc;
use tradehub_core::Config;

/// Create a document store based on configuration
pub async fn create_document_store(config: &Config) -> StorageResult<Arc<dyn DocumentStore>> {
    match config.storage_backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory document store");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let store = LocalDocumentStore::new(&config.local_storage_path).await?;
            tracing::info!(
                path = %config.local_storage_path,
                "Using local document store"
            );
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_memory_store() {
        let config = Config {
            storage_backend: StorageBackend::Memory,
            ..Config::default()
        };
        let store = create_document_store(&config).await.unwrap();
        assert_eq!(store.backend_type(), StorageBackend::Memory);
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn test_creates_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_backend: StorageBackend::Local,
            local_storage_path: dir.path().join("docs").display().to_string(),
            ..Config::default()
        };
        let store = create_document_store(&config).await.unwrap();
        assert_eq!(store.backend_type(), StorageBackend::Local);
        assert!(dir.path().join("docs").is_dir());
    }
}
