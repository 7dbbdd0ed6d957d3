//! Content item model: one ordered, typed block of page content.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Typed content payload, discriminated by `contentType`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "contentType", rename_all = "camelCase")]
pub enum ContentBody {
    #[serde(rename_all = "camelCase")]
    Hero {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtitle: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_url: Option<String>,
        /// "image" or "video"; defaults to image when a media URL is present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cta_label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cta_href: Option<String>,
    },
    Text {
        text: String,
    },
    #[serde(rename = "richText")]
    RichText {
        html: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Video {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        poster_url: Option<String>,
    },
    #[serde(rename = "cardManifest", rename_all = "camelCase")]
    CardManifest { manifest_id: String },
    #[serde(rename_all = "camelCase")]
    Signup {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headline: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button_label: Option<String>,
    },
}

impl ContentBody {
    /// Validate invariants the tag alone cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            ContentBody::Hero { title, .. } if title.trim().is_empty() => Err(
                AppError::Validation("Hero title is required".to_string()),
            ),
            ContentBody::Text { text } if text.trim().is_empty() => {
                Err(AppError::Validation("Text content is required".to_string()))
            }
            ContentBody::Image { url, .. } if url.trim().is_empty() => {
                Err(AppError::Validation("Image URL is required".to_string()))
            }
            ContentBody::Video { url, .. } if url.trim().is_empty() => {
                Err(AppError::Validation("Video URL is required".to_string()))
            }
            ContentBody::CardManifest { manifest_id } if manifest_id.trim().is_empty() => Err(
                AppError::Validation("Card manifest id is required".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// One ordered, typed block of page content belonging to a site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub site_id: String,
    /// Section tag; `hero|description|cards|signup` are rendered by the generator.
    pub section: String,
    pub body: ContentBody,
    /// Render order within the section; values need not be contiguous.
    pub order: i64,
    pub visible: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a content item.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContentRequest {
    pub section: String,
    pub body: ContentBody,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

/// Request body for partially updating a content item.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContentRequest {
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub body: Option<ContentBody>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub visible: Option<bool>,
}
