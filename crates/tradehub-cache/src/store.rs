//! Persistent tier of the image cache.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tradehub_core::{AppError, AppResult, CacheEntry};
use uuid::Uuid;

const ENTRY_EXTENSION: &str = "json";

/// Where cache entries survive between runs.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load_all(&self) -> AppResult<Vec<CacheEntry>>;

    /// Create or overwrite the entry for `entry.id`
    async fn save(&self, entry: &CacheEntry) -> AppResult<()>;

    /// Removing an absent key succeeds
    async fn remove(&self, key: &str) -> AppResult<()>;

    async fn clear(&self) -> AppResult<()>;
}

/// Memory-only cache: nothing is persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCacheStore;

#[async_trait]
impl CacheStore for NullCacheStore {
    async fn load_all(&self) -> AppResult<Vec<CacheEntry>> {
        Ok(Vec::new())
    }

    async fn save(&self, _entry: &CacheEntry) -> AppResult<()> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> AppResult<()> {
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        Ok(())
    }
}

/// One JSON file per entry, named by the SHA-256 of the key.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    dir: PathBuf,
}

impl DiskCacheStore {
    pub async fn new(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Storage(format!(
                "Failed to create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    async fn entry_files(&self) -> AppResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn load_all(&self) -> AppResult<Vec<CacheEntry>> {
        let mut loaded = Vec::new();
        for path in self.entry_files().await? {
            let data = match fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Unreadable cache entry");
                    continue;
                }
            };
            match serde_json::from_slice::<CacheEntry>(&data) {
                Ok(entry) => loaded.push(entry),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Discarding malformed cache entry"
                    );
                    let _ = fs::remove_file(&path).await;
                }
            }
        }
        Ok(loaded)
    }

    async fn save(&self, entry: &CacheEntry) -> AppResult<()> {
        let path = self.entry_path(&entry.id);
        let bytes = serde_json::to_vec(entry)?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(format!(".tmp-{}", Uuid::new_v4().simple()));
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> AppResult<()> {
        for path in self.entry_files().await? {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
