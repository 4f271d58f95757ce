//! TradeHub Cache Library
//!
//! Device-local cache of reconstructed full-image data URLs, keyed by blob
//! reference. Bounded by total byte size with least-recently-used eviction and
//! an age-based expiry. An optional persistent tier keeps entries across runs.

pub mod cache;
pub mod clock;
pub mod store;
pub mod sweeper;

pub use cache::{CacheConfig, CacheFill, ImageCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CacheStore, DiskCacheStore, NullCacheStore};
pub use sweeper::spawn_sweeper;
