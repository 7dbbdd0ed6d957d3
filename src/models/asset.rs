//! Asset model: an uploaded binary object belonging to a site.

use serde::{Deserialize, Serialize};

/// Media kind derived from the asset's MIME type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Audio,
    Document,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
            AssetKind::Audio => "audio",
            AssetKind::Document => "document",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "image" => Some(AssetKind::Image),
            "video" => Some(AssetKind::Video),
            "audio" => Some(AssetKind::Audio),
            "document" => Some(AssetKind::Document),
            _ => None,
        }
    }

    /// Classify a MIME type; anything that is not image/video/audio is a document.
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next().unwrap_or("") {
            "image" => AssetKind::Image,
            "video" => AssetKind::Video,
            "audio" => AssetKind::Audio,
            _ => AssetKind::Document,
        }
    }
}

/// An uploaded binary object stored in the external blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub site_id: String,
    pub kind: AssetKind,
    pub url: String,
    pub filename: String,
    pub content_type: String,
    /// Byte size; None until a storage-provider callback reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for registering an asset uploaded directly to storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub token: String,
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}
