//! Configuration module
//!
//! Settings for the document store, the blob chunking layer, the local image
//! cache, thumbnail/upload processing, fetch retries and the PIX merchant data.
//! Loaded from the environment (optionally via a `.env` file) and validated
//! before use.

use std::env;
use std::time::Duration;

use crate::constants::*;
use crate::storage_types::StorageBackend;

const DEFAULT_LOCAL_STORAGE_PATH: &str = "./data/documents";

#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    // Document store
    pub storage_backend: StorageBackend,
    pub local_storage_path: String,
    // Blob chunking
    pub chunk_size: usize,
    pub chunk_fetch_concurrency: usize,
    // Local image cache
    pub cache_capacity_bytes: u64,
    pub cache_expiry_secs: u64,
    /// Directory of the persistent cache tier; `None` keeps the cache in memory only.
    pub cache_dir: Option<String>,
    /// 0 disables the background sweeper.
    pub cache_sweep_interval_secs: u64,
    // Image processing
    pub thumbnail_max_dimension: u32,
    pub thumbnail_quality: u8,
    pub upload_max_width: u32,
    pub upload_quality: u8,
    // Reconstruction retries
    pub fetch_max_attempts: u32,
    pub fetch_backoff_ms: u64,
    // PIX merchant data
    pub pix_key: Option<String>,
    pub pix_merchant_name: Option<String>,
    pub pix_merchant_city: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            storage_backend: StorageBackend::Local,
            local_storage_path: DEFAULT_LOCAL_STORAGE_PATH.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_fetch_concurrency: DEFAULT_CHUNK_FETCH_CONCURRENCY,
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY_BYTES,
            cache_expiry_secs: DEFAULT_CACHE_EXPIRY_SECS,
            cache_dir: None,
            cache_sweep_interval_secs: DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
            thumbnail_max_dimension: DEFAULT_THUMBNAIL_MAX_DIMENSION,
            thumbnail_quality: DEFAULT_THUMBNAIL_QUALITY,
            upload_max_width: DEFAULT_UPLOAD_MAX_WIDTH,
            upload_quality: DEFAULT_UPLOAD_QUALITY,
            fetch_max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
            fetch_backoff_ms: DEFAULT_FETCH_BACKOFF_MS,
            pix_key: None,
            pix_merchant_name: None,
            pix_merchant_city: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => defaults.storage_backend,
        };

        let cache_capacity_bytes = match lookup("IMAGE_CACHE_CAPACITY_MB") {
            Some(value) => {
                value
                    .parse::<u64>()
                    .map_err(|_| anyhow::anyhow!("IMAGE_CACHE_CAPACITY_MB must be a valid number"))?
                    * 1024
                    * 1024
            }
            None => defaults.cache_capacity_bytes,
        };

        let cache_expiry_secs = match lookup("IMAGE_CACHE_EXPIRY_DAYS") {
            Some(value) => {
                value
                    .parse::<u64>()
                    .map_err(|_| anyhow::anyhow!("IMAGE_CACHE_EXPIRY_DAYS must be a valid number"))?
                    * 24
                    * 60
                    * 60
            }
            None => defaults.cache_expiry_secs,
        };

        let config = Config {
            environment: lookup("ENVIRONMENT")
                .or_else(|| lookup("APP_ENV"))
                .unwrap_or(defaults.environment),
            storage_backend,
            local_storage_path: lookup("LOCAL_STORAGE_PATH").unwrap_or(defaults.local_storage_path),
            chunk_size: parse_or(&lookup, "CHUNK_SIZE", defaults.chunk_size)?,
            chunk_fetch_concurrency: parse_or(
                &lookup,
                "CHUNK_FETCH_CONCURRENCY",
                defaults.chunk_fetch_concurrency,
            )?,
            cache_capacity_bytes,
            cache_expiry_secs,
            cache_dir: lookup("IMAGE_CACHE_DIR").filter(|s| !s.trim().is_empty()),
            cache_sweep_interval_secs: parse_or(
                &lookup,
                "IMAGE_CACHE_SWEEP_INTERVAL_SECS",
                defaults.cache_sweep_interval_secs,
            )?,
            thumbnail_max_dimension: parse_or(
                &lookup,
                "THUMBNAIL_MAX_DIMENSION",
                defaults.thumbnail_max_dimension,
            )?,
            thumbnail_quality: parse_or(&lookup, "THUMBNAIL_QUALITY", defaults.thumbnail_quality)?,
            upload_max_width: parse_or(&lookup, "UPLOAD_MAX_WIDTH", defaults.upload_max_width)?,
            upload_quality: parse_or(&lookup, "UPLOAD_QUALITY", defaults.upload_quality)?,
            fetch_max_attempts: parse_or(
                &lookup,
                "FETCH_MAX_ATTEMPTS",
                defaults.fetch_max_attempts,
            )?,
            fetch_backoff_ms: parse_or(&lookup, "FETCH_BACKOFF_MS", defaults.fetch_backoff_ms)?,
            pix_key: lookup("PIX_KEY"),
            pix_merchant_name: lookup("PIX_MERCHANT_NAME"),
            pix_merchant_city: lookup("PIX_MERCHANT_CITY"),
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.chunk_size == 0 {
            return Err(anyhow::anyhow!("CHUNK_SIZE must be greater than 0"));
        }

        if self.chunk_fetch_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "CHUNK_FETCH_CONCURRENCY must be greater than 0"
            ));
        }

        if self.cache_capacity_bytes == 0 {
            return Err(anyhow::anyhow!(
                "IMAGE_CACHE_CAPACITY_MB must be greater than 0"
            ));
        }

        if self.fetch_max_attempts == 0 {
            return Err(anyhow::anyhow!("FETCH_MAX_ATTEMPTS must be at least 1"));
        }

        if self.thumbnail_max_dimension == 0 {
            return Err(anyhow::anyhow!(
                "THUMBNAIL_MAX_DIMENSION must be greater than 0"
            ));
        }

        if self.upload_max_width == 0 {
            return Err(anyhow::anyhow!("UPLOAD_MAX_WIDTH must be greater than 0"));
        }

        for (name, quality) in [
            ("THUMBNAIL_QUALITY", self.thumbnail_quality),
            ("UPLOAD_QUALITY", self.upload_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(anyhow::anyhow!("{} must be between 1 and 100", name));
            }
        }

        if self.storage_backend == StorageBackend::Local && self.local_storage_path.trim().is_empty()
        {
            return Err(anyhow::anyhow!(
                "LOCAL_STORAGE_PATH must be set when using local storage backend"
            ));
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn cache_expiry(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_secs)
    }

    pub fn cache_sweep_interval(&self) -> Option<Duration> {
        if self.cache_sweep_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.cache_sweep_interval_secs))
        }
    }

    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, anyhow::Error>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", key)),
        None => Ok(default),
    }
}
