use crate::keys::{validate_collection_path, validate_document_path};
use crate::traits::{DocumentStore, StorageResult, WriteBatch, WriteOp};
use crate::StorageBackend;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory document store
///
/// Documents are kept in a sorted map keyed by full path, so listing a
/// collection is a range scan. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all collections
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> StorageResult<Option<Value>> {
        validate_document_path(path)?;
        Ok(self.documents.read().await.get(path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> StorageResult<()> {
        validate_document_path(path)?;
        self.documents.write().await.insert(path.to_string(), value);
        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        validate_document_path(path)?;
        self.documents.write().await.remove(path);
        Ok(())
    }

    async fn list(&self, collection: &str) -> StorageResult<Vec<String>> {
        validate_collection_path(collection)?;
        let prefix = format!("{}/", collection);
        let documents = self.documents.read().await;
        let ids = documents
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, _)| {
                let id = &path[prefix.len()..];
                (!id.contains('/')).then(|| id.to_string())
            })
            .collect();
        Ok(ids)
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        for op in batch.ops() {
            validate_document_path(op.path())?;
        }

        let mut documents = self.documents.write().await;
        for op in batch.into_ops() {
            match op {
                WriteOp::Set { path, value } => {
                    documents.insert(path, value);
                }
                WriteOp::Delete { path } => {
                    documents.remove(&path);
                }
            }
        }
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StorageError;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryDocumentStore::new();
        store.set("c/a", json!({"x": 1})).await.unwrap();
        assert_eq!(store.get("c/a").await.unwrap(), Some(json!({"x": 1})));

        store.delete("c/a").await.unwrap();
        assert_eq!(store.get("c/a").await.unwrap(), None);
        // Deleting again is fine
        store.delete("c/a").await.unwrap();
    }

    #[tokio::test]
    async fn list_only_returns_direct_children() {
        let store = MemoryDocumentStore::new();
        store.set("c/b", json!(1)).await.unwrap();
        store.set("c/a", json!(1)).await.unwrap();
        store.set("c/a/sub/x", json!(1)).await.unwrap();
        store.set("cc/z", json!(1)).await.unwrap();

        assert_eq!(store.list("c").await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.list("c/a/sub").await.unwrap(), vec!["x"]);
        assert!(store.list("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_batch_applies_nothing() {
        let store = MemoryDocumentStore::new();
        let mut batch = WriteBatch::new();
        batch.set("c/a", json!(1)).set("c/../b", json!(2));

        let result = store.commit(batch).await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
        assert_eq!(store.document_count().await, 0);
    }

    #[tokio::test]
    async fn rejects_collection_paths_for_documents() {
        let store = MemoryDocumentStore::new();
        assert!(store.get("c").await.is_err());
        assert!(store.list("c/a").await.is_err());
    }
}
