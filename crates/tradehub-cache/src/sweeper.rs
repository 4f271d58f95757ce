use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cache::ImageCache;

/// Periodically sweep expired entries and flush refreshed access times.
///
/// Stops when `cancel_token` is cancelled or the cache is disposed.
pub fn spawn_sweeper(
    cache: Arc<ImageCache>,
    every: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    if cache.is_disposed().await {
                        break;
                    }
                    let removed = cache.sweep_expired().await;
                    let flushed = cache.flush().await;
                    tracing::debug!(
                        removed = removed,
                        flushed = flushed,
                        "Image cache sweep finished"
                    );
                }
            }
        }
        tracing::debug!("Image cache sweeper stopped");
    })
}
