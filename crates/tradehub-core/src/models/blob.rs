use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{DEFAULT_CHUNK_SIZE, FALLBACK_MIME_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Metadata document of a stored full image (`products-images/{id}`).
///
/// The payload itself lives in `chunk_count` child documents of the `chunks`
/// subcollection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobDocument {
    pub file_name: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// MIME type reported for the original upload, before compression.
    #[serde(rename = "type", default)]
    pub source_type: String,
    /// Original upload size in bytes. Older documents store it as a string.
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
    #[serde(default)]
    pub chunk_count: usize,
    /// Characters per chunk the payload was split into. Documents written
    /// before the field existed always used the default size.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    pub created_at: DateTime<Utc>,
    pub product_id: String,
    pub user_id: String,
}

fn default_mime_type() -> String {
    FALLBACK_MIME_TYPE.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSize {
        Number(u64),
        Text(String),
    }

    match Option::<RawSize>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawSize::Number(n)) => Ok(Some(n)),
        Some(RawSize::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawSize::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid size: {}", s))),
    }
}

/// Child document `chunk{i}` holding one slice of the base64 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDocument {
    pub data: String,
}
