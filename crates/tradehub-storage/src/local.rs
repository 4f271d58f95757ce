use crate::keys::{validate_collection_path, validate_document_path};
use crate::traits::{DocumentStore, StorageError, StorageResult, WriteBatch, WriteOp};
use crate::StorageBackend;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const DOCUMENT_EXTENSION: &str = "json";

/// Local filesystem document store
///
/// Every document is one JSON file: `products-images/abc` is stored at
/// `{base}/products-images/abc.json` and its chunk subcollection under
/// `{base}/products-images/abc/chunks/`.
#[derive(Clone)]
pub struct LocalDocumentStore {
    base_path: PathBuf,
}

impl LocalDocumentStore {
    /// Create a new LocalDocumentStore instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for documents (e.g., "./data/documents")
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalDocumentStore { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a document path to its JSON file with security validation
    fn document_to_path(&self, path: &str) -> StorageResult<PathBuf> {
        validate_document_path(path)?;
        let file = self
            .base_path
            .join(format!("{}.{}", path, DOCUMENT_EXTENSION));
        self.ensure_inside_base(&file)?;
        Ok(file)
    }

    fn collection_to_dir(&self, collection: &str) -> StorageResult<PathBuf> {
        validate_collection_path(collection)?;
        let dir = self.base_path.join(collection);
        self.ensure_inside_base(&dir)?;
        Ok(dir)
    }

    /// Reject paths that resolve outside the base directory through symlinks.
    fn ensure_inside_base(&self, path: &Path) -> StorageResult<()> {
        let Ok(canonical) = path.canonicalize() else {
            // Not created yet; segments were already validated.
            return Ok(());
        };
        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;
        if canonical.strip_prefix(&base_canonical).is_err() {
            return Err(StorageError::InvalidPath(
                "Document path resolves outside storage directory".to_string(),
            ));
        }
        Ok(())
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write the value to a sibling temporary file and return its path.
    async fn stage(&self, file_path: &Path, value: &Value) -> StorageResult<PathBuf> {
        self.ensure_parent_dir(file_path).await?;
        let bytes = serde_json::to_vec(value)?;

        let mut tmp_name = file_path.as_os_str().to_owned();
        tmp_name.push(format!(".tmp-{}", Uuid::new_v4().simple()));
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to create file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        file.write_all(&bytes).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to write file {}: {}", tmp_path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to sync file {}: {}", tmp_path.display(), e))
        })?;

        Ok(tmp_path)
    }

    async fn remove_file_if_exists(&self, path: &Path) -> StorageResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn get(&self, path: &str) -> StorageResult<Option<Value>> {
        let file_path = self.document_to_path(path)?;

        let data = match fs::read(&file_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "Failed to read file {}: {}",
                    file_path.display(),
                    e
                )))
            }
        };

        let value = serde_json::from_slice(&data)?;

        tracing::debug!(
            path = %file_path.display(),
            key = %path,
            size_bytes = data.len(),
            "Local document read"
        );

        Ok(Some(value))
    }

    async fn set(&self, path: &str, value: Value) -> StorageResult<()> {
        let file_path = self.document_to_path(path)?;
        let start = std::time::Instant::now();

        let tmp_path = self.stage(&file_path, &value).await?;
        if let Err(e) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::WriteFailed(format!(
                "Failed to move {} into place: {}",
                file_path.display(),
                e
            )));
        }

        tracing::debug!(
            path = %file_path.display(),
            key = %path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local document write successful"
        );

        Ok(())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let file_path = self.document_to_path(path)?;

        if self.remove_file_if_exists(&file_path).await? {
            tracing::debug!(
                path = %file_path.display(),
                key = %path,
                "Local document delete successful"
            );
        }

        Ok(())
    }

    async fn list(&self, collection: &str) -> StorageResult<Vec<String>> {
        let dir = self.collection_to_dir(collection)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "Failed to list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(id) = name.strip_suffix(&format!(".{}", DOCUMENT_EXTENSION)) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let op_count = batch.len();

        // Resolve every path before touching the disk
        let mut resolved = Vec::with_capacity(op_count);
        for op in batch.into_ops() {
            let file_path = self.document_to_path(op.path())?;
            resolved.push((file_path, op));
        }

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
        for (file_path, op) in &resolved {
            if let WriteOp::Set { value, .. } = op {
                match self.stage(file_path, value).await {
                    Ok(tmp_path) => staged.push((tmp_path, file_path.clone())),
                    Err(e) => {
                        for (tmp_path, _) in &staged {
                            let _ = fs::remove_file(tmp_path).await;
                        }
                        return Err(e);
                    }
                }
            }
        }

        for (tmp_path, file_path) in &staged {
            fs::rename(tmp_path, file_path).await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to move {} into place: {}",
                    file_path.display(),
                    e
                ))
            })?;
        }

        for (file_path, op) in &resolved {
            if let WriteOp::Delete { .. } = op {
                self.remove_file_if_exists(file_path).await?;
            }
        }

        tracing::info!(
            base = %self.base_path.display(),
            op_count = op_count,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local batch commit successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
