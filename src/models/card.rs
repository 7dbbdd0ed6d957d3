//! Card manifest model: a flippable 3D collectible card description.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Structured description of a collectible card visual.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardManifestBody {
    pub width_mm: f64,
    pub height_mm: f64,
    pub front_image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_image_url: Option<String>,
    #[serde(default)]
    pub foil: bool,
    #[serde(default)]
    pub holographic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl CardManifestBody {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.width_mm <= 0.0 || self.height_mm <= 0.0 {
            return Err(AppError::Validation(
                "Card dimensions must be positive".to_string(),
            ));
        }
        if self.front_image_url.trim().is_empty() {
            return Err(AppError::Validation(
                "Front image URL is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A card manifest row belonging to a site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardManifest {
    pub id: String,
    pub site_id: String,
    pub manifest: CardManifestBody,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a card manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardRequest {
    pub manifest: CardManifestBody,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Request body for partially updating a card manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCardRequest {
    #[serde(default)]
    pub manifest: Option<CardManifestBody>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> CardManifestBody {
        CardManifestBody {
            width_mm: 63.0,
            height_mm: 88.0,
            front_image_url: "https://blob.example/front.png".to_string(),
            front_video_url: None,
            back_image_url: None,
            foil: true,
            holographic: false,
            metadata: None,
        }
    }

    #[test]
    fn test_valid_manifest() {
        assert!(manifest().validate().is_ok());
    }

    #[test]
    fn test_non_positive_dimensions_rejected() {
        let mut m = manifest();
        m.width_mm = 0.0;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_missing_front_image_rejected() {
        let mut m = manifest();
        m.front_image_url = String::new();
        assert!(m.validate().is_err());
    }
}
