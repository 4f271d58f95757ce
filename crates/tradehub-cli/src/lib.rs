use anyhow::Context;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tradehub_cache::{
    spawn_sweeper, CacheConfig, CacheStore, DiskCacheStore, ImageCache, NullCacheStore,
    SystemClock,
};
use tradehub_core::Config;
use tradehub_services::{ImageResolver, ProductImageService, RetryPolicy};
use tradehub_storage::{create_document_store, BlobStore};

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Components wired from one [`Config`].
pub struct AppContext {
    pub config: Config,
    pub blobs: BlobStore,
    pub cache: Arc<ImageCache>,
    pub resolver: ImageResolver,
    pub images: ProductImageService,
    sweeper_token: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl AppContext {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate().context("Invalid configuration")?;

        let documents = create_document_store(&config)
            .await
            .context("Failed to open document store")?;
        let blobs = BlobStore::from_config(documents, &config);

        let cache_store: Arc<dyn CacheStore> = match &config.cache_dir {
            Some(dir) => Arc::new(
                DiskCacheStore::new(dir)
                    .await
                    .with_context(|| format!("Failed to open image cache at {}", dir))?,
            ),
            None => Arc::new(NullCacheStore),
        };
        let cache = Arc::new(
            ImageCache::init(
                CacheConfig::from_config(&config),
                cache_store,
                Arc::new(SystemClock),
            )
            .await,
        );

        let resolver = ImageResolver::new(blobs.clone(), cache.clone())
            .with_retry_policy(RetryPolicy::from_config(&config));
        let images = ProductImageService::from_config(blobs.clone(), cache.clone(), &config);

        let sweeper_token = CancellationToken::new();
        let sweeper = config
            .cache_sweep_interval()
            .map(|every| spawn_sweeper(cache.clone(), every, sweeper_token.clone()));

        Ok(Self {
            config,
            blobs,
            cache,
            resolver,
            images,
            sweeper_token,
            sweeper,
        })
    }

    pub fn has_sweeper(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Stop the cache sweeper and flush cache bookkeeping before exit.
    pub async fn shutdown(self) {
        self.sweeper_token.cancel();
        if let Some(sweeper) = self.sweeper {
            if let Err(e) = sweeper.await {
                tracing::warn!(error = %e, "Image cache sweeper task failed");
            }
        }
        self.cache.dispose().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradehub_core::{DataUrl, StorageBackend};

    #[test]
    fn truncate_string_short() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("", 5), "");
        assert_eq!(truncate_string("hello", 5), "hello");
    }

    #[test]
    fn truncate_string_long() {
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("abc", 2), "...");
        assert_eq!(truncate_string("ação completa", 6), "açã...");
    }

    #[tokio::test]
    async fn context_wires_local_store_and_disk_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_backend: StorageBackend::Local,
            local_storage_path: dir.path().join("documents").display().to_string(),
            cache_dir: Some(dir.path().join("cache").display().to_string()),
            ..Config::default()
        };

        let ctx = AppContext::from_config(config).await.unwrap();
        let reference = ctx
            .blobs
            .store(tradehub_storage::StoreRequest {
                payload: "QUJD".to_string(),
                mime_type: "image/jpeg".to_string(),
                file_name: "a.jpg".to_string(),
                product_id: "p".to_string(),
                user_id: "u".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let resolved = ctx.resolver.resolve(&reference).await.unwrap();
        assert_eq!(&*resolved, DataUrl::new("image/jpeg", "QUJD").to_string());
        ctx.shutdown().await;

        assert!(dir.path().join("cache").read_dir().unwrap().count() > 0);
    }

    #[tokio::test]
    async fn shutdown_stops_sweeper() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_backend: StorageBackend::Memory,
            local_storage_path: dir.path().display().to_string(),
            cache_sweep_interval_secs: 3600,
            ..Config::default()
        };
        let ctx = AppContext::from_config(config).await.unwrap();
        assert!(ctx.has_sweeper());

        let cache = ctx.cache.clone();
        tokio::time::timeout(std::time::Duration::from_secs(5), ctx.shutdown())
            .await
            .unwrap();
        assert!(cache.is_disposed().await);
    }

    #[tokio::test]
    async fn zero_sweep_interval_disables_sweeper() {
        let config = Config {
            storage_backend: StorageBackend::Memory,
            cache_sweep_interval_secs: 0,
            ..Config::default()
        };
        let ctx = AppContext::from_config(config).await.unwrap();
        assert!(!ctx.has_sweeper());
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn context_rejects_invalid_config() {
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(AppContext::from_config(config).await.is_err());
    }
}
