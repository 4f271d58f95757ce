use serde::{Deserialize, Serialize};

/// One entry of the device-local image cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Blob reference the data URL was reconstructed from.
    pub id: String,
    /// Reconstructed `data:` URL.
    pub data: String,
    /// Last access, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Approximate decoded payload size in bytes.
    pub size: u64,
}

impl CacheEntry {
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis.saturating_sub(self.timestamp)
    }
}
