//! Site model: one tenant-managed campaign microsite.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a site in the portal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Draft,
    Published,
    Archived,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Draft => "draft",
            SiteStatus::Published => "published",
            SiteStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(SiteStatus::Draft),
            "published" => Some(SiteStatus::Published),
            "archived" => Some(SiteStatus::Archived),
            _ => None,
        }
    }
}

/// Status of the site's most recent external deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Idle,
    Building,
    Ready,
    Error,
    Canceled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Idle => "idle",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Ready => "ready",
            DeploymentStatus::Error => "error",
            DeploymentStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(DeploymentStatus::Idle),
            "building" => Some(DeploymentStatus::Building),
            "ready" => Some(DeploymentStatus::Ready),
            "error" => Some(DeploymentStatus::Error),
            "canceled" => Some(DeploymentStatus::Canceled),
            _ => None,
        }
    }
}

/// A campaign microsite record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    pub display_name: String,
    /// Globally unique URL slug.
    pub slug: String,
    pub status: SiteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Whether the generated site bundles end-user authentication.
    pub user_management: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_publishable_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_secret_key: Option<String>,
    /// Deployment bookkeeping; written only by the deploy/status/webhook paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosting_project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosting_deployment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
    pub deployment_status: DeploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a new site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiteRequest {
    pub name: String,
    pub display_name: String,
    pub slug: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub user_management: bool,
    #[serde(default)]
    pub auth_publishable_key: Option<String>,
    #[serde(default)]
    pub auth_secret_key: Option<String>,
}

/// Request body for partially updating a site.
///
/// Deployment bookkeeping fields are deliberately absent; those are owned by
/// the deploy, status and webhook paths.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSiteRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: Option<SiteStatus>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub user_management: Option<bool>,
    #[serde(default)]
    pub auth_publishable_key: Option<String>,
    #[serde(default)]
    pub auth_secret_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_status_round_trip() {
        for s in ["idle", "building", "ready", "error", "canceled"] {
            assert_eq!(DeploymentStatus::from_str(s).unwrap().as_str(), s);
        }
        assert!(DeploymentStatus::from_str("queued").is_none());
    }

    #[test]
    fn test_site_status_round_trip() {
        for s in ["draft", "published", "archived"] {
            assert_eq!(SiteStatus::from_str(s).unwrap().as_str(), s);
        }
    }
}
