use serde::{Deserialize, Serialize};

/// One media entry of a product (`imageMetadataRef[]`).
///
/// Stored documents use a flat shape with mutually exclusive nullable fields;
/// conversion from that shape rejects entries that mix the two kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ImageMetadataDocument", into = "ImageMetadataDocument")]
pub enum ImageMetadata {
    Image {
        thumbnail_data_url: String,
        /// Path of the blob metadata document (`products-images/{id}`).
        full_image_ref: String,
    },
    Video {
        thumbnail_data_url: String,
        video_id: String,
        video_url: Option<String>,
    },
}

impl ImageMetadata {
    pub fn thumbnail_data_url(&self) -> &str {
        match self {
            ImageMetadata::Image {
                thumbnail_data_url, ..
            }
            | ImageMetadata::Video {
                thumbnail_data_url, ..
            } => thumbnail_data_url,
        }
    }

    /// Blob reference backing this entry, if it is an image.
    pub fn blob_reference(&self) -> Option<&str> {
        match self {
            ImageMetadata::Image { full_image_ref, .. } => Some(full_image_ref),
            ImageMetadata::Video { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ImageMetadata::Image { .. } => "image",
            ImageMetadata::Video { .. } => "youtube",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageMetadataDocument {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "thumbnailDataURL", default)]
    thumbnail_data_url: String,
    #[serde(default)]
    full_image_ref: Option<String>,
    #[serde(default)]
    video_id: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
}

impl TryFrom<ImageMetadataDocument> for ImageMetadata {
    type Error = String;

    fn try_from(doc: ImageMetadataDocument) -> Result<Self, Self::Error> {
        match doc.kind.as_str() {
            "image" => {
                if doc.video_id.is_some() || doc.video_url.is_some() {
                    return Err("image entry must not carry video fields".to_string());
                }
                let full_image_ref = doc
                    .full_image_ref
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| "image entry requires fullImageRef".to_string())?;
                Ok(ImageMetadata::Image {
                    thumbnail_data_url: doc.thumbnail_data_url,
                    full_image_ref,
                })
            }
            "youtube" => {
                if doc.full_image_ref.is_some() {
                    return Err("video entry must not carry fullImageRef".to_string());
                }
                let video_id = doc
                    .video_id
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| "video entry requires videoId".to_string())?;
                Ok(ImageMetadata::Video {
                    thumbnail_data_url: doc.thumbnail_data_url,
                    video_id,
                    video_url: doc.video_url,
                })
            }
            other => Err(format!("unknown media type: {}", other)),
        }
    }
}

impl From<ImageMetadata> for ImageMetadataDocument {
    fn from(meta: ImageMetadata) -> Self {
        match meta {
            ImageMetadata::Image {
                thumbnail_data_url,
                full_image_ref,
            } => ImageMetadataDocument {
                kind: "image".to_string(),
                thumbnail_data_url,
                full_image_ref: Some(full_image_ref),
                video_id: None,
                video_url: None,
            },
            ImageMetadata::Video {
                thumbnail_data_url,
                video_id,
                video_url,
            } => ImageMetadataDocument {
                kind: "youtube".to_string(),
                thumbnail_data_url,
                full_image_ref: None,
                video_id: Some(video_id),
                video_url,
            },
        }
    }
}
