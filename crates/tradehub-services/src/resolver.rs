//! Blob reference to full-image data URL, through the local cache.
//!
//! Concurrent misses for the same reference share one in-flight fetch. The
//! in-flight map only holds weak handles, so a fetch whose callers have all
//! gone away is dropped instead of finishing in the background.

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tradehub_cache::ImageCache;
use tradehub_core::{AppError, AppResult};
use tradehub_storage::BlobStore;

use crate::retry::RetryPolicy;

type SharedFetch = Shared<BoxFuture<'static, AppResult<Arc<str>>>>;
type InFlight = Arc<Mutex<HashMap<String, WeakShared<BoxFuture<'static, AppResult<Arc<str>>>>>>>;

fn lock_in_flight(
    in_flight: &InFlight,
) -> MutexGuard<'_, HashMap<String, WeakShared<BoxFuture<'static, AppResult<Arc<str>>>>>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ImageResolver {
    blobs: BlobStore,
    cache: Arc<ImageCache>,
    retry: RetryPolicy,
    in_flight: InFlight,
}

impl ImageResolver {
    pub fn new(blobs: BlobStore, cache: Arc<ImageCache>) -> Self {
        Self {
            blobs,
            cache,
            retry: RetryPolicy::default(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Data URL of the blob behind `reference`.
    pub async fn resolve(&self, reference: &str) -> AppResult<Arc<str>> {
        self.resolve_with_cancel(reference, &CancellationToken::new())
            .await
    }

    /// Like [`ImageResolver::resolve`], giving up with [`AppError::Cancelled`]
    /// once `cancel_token` fires.
    pub async fn resolve_with_cancel(
        &self,
        reference: &str,
        cancel_token: &CancellationToken,
    ) -> AppResult<Arc<str>> {
        if cancel_token.is_cancelled() {
            return Err(AppError::Cancelled(format!("resolve {}", reference)));
        }

        if let Some(data) = self.cache.get(reference).await {
            tracing::debug!(key = %reference, "Image cache hit");
            return Ok(data);
        }

        let fetch = self.shared_fetch(reference);
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                tracing::debug!(key = %reference, "Image resolve cancelled");
                Err(AppError::Cancelled(format!("resolve {}", reference)))
            }
            result = fetch => result,
        }
    }

    /// Drop the cached data URL of `reference`.
    pub async fn invalidate(&self, reference: &str) -> bool {
        self.cache.invalidate(reference).await
    }

    /// Number of fetches currently shared by at least one caller.
    pub fn in_flight(&self) -> usize {
        lock_in_flight(&self.in_flight)
            .values()
            .filter(|weak| weak.upgrade().is_some())
            .count()
    }

    fn shared_fetch(&self, reference: &str) -> SharedFetch {
        let mut in_flight = lock_in_flight(&self.in_flight);
        if let Some(existing) = in_flight.get(reference).and_then(WeakShared::upgrade) {
            tracing::debug!(key = %reference, "Joining in-flight image fetch");
            return existing;
        }

        // Fetches abandoned by every caller leave dead handles behind
        in_flight.retain(|_, weak| weak.upgrade().is_some());

        let fetch = Self::fetch_and_cache(
            self.blobs.clone(),
            self.cache.clone(),
            self.retry,
            self.in_flight.clone(),
            reference.to_string(),
        )
        .boxed()
        .shared();

        if let Some(weak) = fetch.downgrade() {
            in_flight.insert(reference.to_string(), weak);
        }
        fetch
    }

    async fn fetch_and_cache(
        blobs: BlobStore,
        cache: Arc<ImageCache>,
        retry: RetryPolicy,
        in_flight: InFlight,
        reference: String,
    ) -> AppResult<Arc<str>> {
        let fill = cache.begin_fill(&reference).await;
        let result = retry
            .run(&reference, || blobs.fetch_data_url(&reference))
            .await;

        let resolved = match result {
            Ok(url) => {
                match cache.complete_fill(fill, &url).await {
                    Ok(_) => {}
                    Err(AppError::Disposed(_)) => {
                        tracing::debug!(key = %reference, "Cache disposed, result not cached");
                    }
                    Err(e) => {
                        tracing::warn!(key = %reference, error = %e, "Failed to cache image");
                    }
                }
                Ok(Arc::from(url.to_string()))
            }
            Err(e) => {
                tracing::warn!(key = %reference, error = %e, "Image resolve failed");
                Err(e)
            }
        };

        lock_in_flight(&in_flight).remove(&reference);
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tradehub_cache::CacheConfig;
    use tradehub_storage::testing::RecordingStore;
    use tradehub_storage::StoreRequest;

    fn resolver(store: Arc<RecordingStore>) -> ImageResolver {
        ImageResolver::new(
            BlobStore::new(store),
            Arc::new(ImageCache::in_memory(CacheConfig::default())),
        )
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    async fn seed(resolver: &ImageResolver) -> String {
        resolver
            .blobs()
            .store(StoreRequest {
                payload: "QUJD".repeat(10),
                mime_type: "image/jpeg".to_string(),
                file_name: "a.jpg".to_string(),
                product_id: "p".to_string(),
                user_id: "u".to_string(),
                ..StoreRequest::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let store = Arc::new(RecordingStore::in_memory());
        let resolver = resolver(store.clone());
        let reference = seed(&resolver).await;
        store.clear_ops();

        let token = CancellationToken::new();
        token.cancel();
        let result = resolver.resolve_with_cancel(&reference, &token).await;

        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn abandoned_fetch_does_not_populate_cache() {
        let store = Arc::new(RecordingStore::in_memory());
        let resolver = resolver(store.clone());
        let reference = seed(&resolver).await;
        store.delay_gets(Duration::from_millis(200));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = resolver.resolve_with_cancel(&reference, &token).await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!resolver.cache().contains(&reference).await);
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let store = Arc::new(RecordingStore::in_memory());
        let resolver = resolver(store.clone());
        let reference = seed(&resolver).await;

        resolver.resolve(&reference).await.unwrap();
        assert!(resolver.invalidate(&reference).await);

        store.clear_ops();
        resolver.resolve(&reference).await.unwrap();
        assert_eq!(store.gets_under(&reference), 2);
    }

    #[tokio::test]
    async fn invalidate_during_fetch_keeps_result_out_of_cache() {
        let store = Arc::new(RecordingStore::in_memory());
        let resolver = Arc::new(resolver(store.clone()));
        let reference = seed(&resolver).await;
        store.delay_gets(Duration::from_millis(100));

        let pending = {
            let resolver = resolver.clone();
            let reference = reference.clone();
            tokio::spawn(async move { resolver.resolve(&reference).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        resolver.invalidate(&reference).await;

        // The caller still gets the data it asked for
        assert!(pending.await.unwrap().is_ok());
        assert!(!resolver.cache().contains(&reference).await);
        assert_eq!(resolver.in_flight(), 0);
    }
}
