//! Deployment orchestrator.
//!
//! Realizes a generated file map as a live deployment on the hosting
//! provider and keeps the site's persisted deployment bookkeeping in sync
//! with the platform's actual state. Per-site status lifecycle:
//! `idle -> building -> {ready | error | canceled}`, with `building`
//! re-entered on every redeploy.

mod hosting;

pub use hosting::*;

use std::path::PathBuf;

use chrono::Utc;
use serde::Deserialize;

use crate::db::{DeploymentUpdate, Repository};
use crate::errors::AppError;
use crate::generator;
use crate::models::{DeploymentStatus, Site};

/// Environment variable names pushed to newly created projects when
/// user management is enabled.
const ENV_PUBLISHABLE_KEY: &str = "NEXT_PUBLIC_AUTH_PUBLISHABLE_KEY";
const ENV_SECRET_KEY: &str = "AUTH_SECRET_KEY";

/// Ensure a deployment URL carries a scheme.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Map the provider's deployment state vocabulary onto the local enum.
///
/// Ready/error/canceled pass through; building, queued and anything
/// unrecognized map to `building`.
pub fn map_remote_state(state: &str) -> DeploymentStatus {
    match state.to_ascii_uppercase().as_str() {
        "READY" | "SUCCEEDED" => DeploymentStatus::Ready,
        "ERROR" | "FAILED" => DeploymentStatus::Error,
        "CANCELED" => DeploymentStatus::Canceled,
        _ => DeploymentStatus::Building,
    }
}

/// Status implied by a webhook event type such as `deployment.ready`.
/// Returns None for events that are not deployment lifecycle events.
pub fn status_from_webhook_type(event_type: &str) -> Option<DeploymentStatus> {
    let suffix = event_type.strip_prefix("deployment.")?;
    Some(match suffix {
        "ready" | "succeeded" => DeploymentStatus::Ready,
        "error" | "failed" => DeploymentStatus::Error,
        "canceled" => DeploymentStatus::Canceled,
        // created, building, and any future vocabulary
        _ => DeploymentStatus::Building,
    })
}

/// Log a failed non-critical step and continue.
///
/// The deploy path has several sub-operations whose failure must never abort
/// the deployment (remote rename, env-var push); this makes that contract
/// explicit at the call site.
pub fn non_critical<T>(step: &str, result: Result<T, AppError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(step, error = %err, "non-critical deploy step failed");
            None
        }
    }
}

/// Inbound webhook payload from the hosting provider.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: WebhookBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub deployment: Option<RemoteDeployment>,
    #[serde(default)]
    pub project: Option<WebhookProject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookProject {
    pub id: String,
}

/// Deployment orchestration service.
#[derive(Clone)]
pub struct DeployService {
    repo: Repository,
    hosting: HostingClient,
    templates_dir: PathBuf,
}

impl DeployService {
    pub fn new(repo: Repository, hosting: HostingClient, templates_dir: PathBuf) -> Self {
        Self {
            repo,
            hosting,
            templates_dir,
        }
    }

    /// Deploy a site: generate its project, reconcile the remote project id,
    /// and create a deployment.
    ///
    /// Generation errors surface before any bookkeeping write, so a site
    /// without a template keeps its previous deployment status.
    pub async fn deploy_site(&self, site_id: &str) -> Result<Site, AppError> {
        let project = generator::generate_project(&self.repo, &self.templates_dir, site_id).await?;

        let site = self
            .repo
            .get_site(site_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Site {} not found", site_id)))?;

        let (project_id, first_creation) = self.ensure_remote_project(&site).await?;

        if first_creation && site.user_management {
            self.push_auth_env_vars(&project_id, &site).await;
        }

        match self
            .hosting
            .create_deployment(&project_id, &site.name, &project)
            .await
        {
            Ok(deployment) => {
                let update = DeploymentUpdate {
                    hosting_deployment_id: Some(deployment.id),
                    deployment_url: deployment.url.as_deref().map(normalize_url),
                    deployment_status: Some(DeploymentStatus::Building),
                    last_deployed_at: Some(Utc::now().to_rfc3339()),
                    ..Default::default()
                };
                self.repo.update_deployment(site_id, &update).await
            }
            Err(err) => {
                // Terminal: persist the error state, then surface the message
                let update = DeploymentUpdate {
                    deployment_status: Some(DeploymentStatus::Error),
                    ..Default::default()
                };
                if let Err(persist_err) = self.repo.update_deployment(site_id, &update).await {
                    tracing::error!(error = %persist_err, "failed to persist deployment error state");
                }
                Err(err)
            }
        }
    }

    /// Resolve the remote project id for a site, creating or adopting as
    /// needed. Returns the id and whether the project was created just now.
    async fn ensure_remote_project(&self, site: &Site) -> Result<(String, bool), AppError> {
        if let Some(project_id) = &site.hosting_project_id {
            self.rename_if_stale(project_id, site).await;
            return Ok((project_id.clone(), false));
        }

        let (remote, created) = match self.hosting.create_project(&site.name).await {
            Ok(remote) => (remote, true),
            Err(AppError::Conflict(_)) => {
                // A project with this name already exists remotely; adopt it
                // instead of failing so retries stay idempotent.
                let existing = self
                    .hosting
                    .list_projects()
                    .await?
                    .into_iter()
                    .find(|p| p.name == site.name)
                    .ok_or_else(|| {
                        AppError::Upstream(format!(
                            "Project '{}' reported as existing but not found in listing",
                            site.name
                        ))
                    })?;
                tracing::info!(project_id = %existing.id, "adopted existing remote project");
                (existing, false)
            }
            Err(err) => return Err(err),
        };

        // Persist immediately so a retry after partial failure does not
        // recreate a duplicate project.
        let update = DeploymentUpdate {
            hosting_project_id: Some(remote.id.clone()),
            ..Default::default()
        };
        self.repo.update_deployment(&site.id, &update).await?;

        Ok((remote.id, created))
    }

    /// Best-effort rename of the remote project when the site name changed.
    async fn rename_if_stale(&self, project_id: &str, site: &Site) {
        let remote = non_critical(
            "fetch remote project",
            self.hosting.get_project(project_id).await,
        );
        if let Some(remote) = remote {
            if remote.name != site.name {
                non_critical(
                    "rename remote project",
                    self.hosting.rename_project(project_id, &site.name).await,
                );
            }
        }
    }

    /// Best-effort push of auth env vars after first project creation.
    /// On failure the operator configures them manually.
    async fn push_auth_env_vars(&self, project_id: &str, site: &Site) {
        if let Some(key) = &site.auth_publishable_key {
            non_critical(
                "push publishable key",
                self.hosting
                    .set_env_var(project_id, ENV_PUBLISHABLE_KEY, key)
                    .await,
            );
        }
        if let Some(key) = &site.auth_secret_key {
            non_critical(
                "push secret key",
                self.hosting
                    .set_env_var(project_id, ENV_SECRET_KEY, key)
                    .await,
            );
        }
    }

    /// Query the platform for the latest deployment of a site's project and
    /// persist the mapped status. Safe to call repeatedly; converges with the
    /// webhook path on the same platform state.
    pub async fn reconcile_status(&self, site_id: &str) -> Result<Site, AppError> {
        let site = self
            .repo
            .get_site(site_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Site {} not found", site_id)))?;

        let project_id = site.hosting_project_id.as_deref().ok_or_else(|| {
            AppError::Validation(format!("Site '{}' has never been deployed", site.name))
        })?;

        let Some(deployment) = self.hosting.latest_deployment(project_id).await? else {
            return Ok(site);
        };

        let status = deployment
            .state
            .as_deref()
            .map(map_remote_state)
            .unwrap_or(DeploymentStatus::Building);

        let update = DeploymentUpdate {
            hosting_deployment_id: Some(deployment.id),
            deployment_url: deployment.url.as_deref().map(normalize_url),
            deployment_status: Some(status),
            ..Default::default()
        };
        self.repo.update_deployment(site_id, &update).await
    }

    /// Apply an inbound deployment lifecycle webhook.
    ///
    /// The site is resolved by deployment id first and project id second; a
    /// project accumulates deployments over time but a deployment id is
    /// unique. Returns the updated site, or None when the event is not a
    /// deployment event or no site matches.
    pub async fn handle_webhook(&self, payload: &WebhookPayload) -> Result<Option<Site>, AppError> {
        let Some(status) = status_from_webhook_type(&payload.event_type) else {
            tracing::debug!(event_type = %payload.event_type, "ignoring non-deployment webhook");
            return Ok(None);
        };

        let deployment = payload.payload.deployment.as_ref();

        let mut site = None;
        if let Some(deployment) = deployment {
            site = self.repo.find_site_by_deployment_id(&deployment.id).await?;
        }
        if site.is_none() {
            if let Some(project) = &payload.payload.project {
                site = self.repo.find_site_by_project_id(&project.id).await?;
            }
        }
        let Some(site) = site else {
            tracing::warn!(event_type = %payload.event_type, "webhook did not match any site");
            return Ok(None);
        };

        let update = DeploymentUpdate {
            hosting_deployment_id: deployment.map(|d| d.id.clone()),
            deployment_url: deployment
                .and_then(|d| d.url.as_deref())
                .map(normalize_url),
            deployment_status: Some(status),
            ..Default::default()
        };
        let updated = self.repo.update_deployment(&site.id, &update).await?;
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_adds_scheme() {
        assert_eq!(normalize_url("foo.example.com"), "https://foo.example.com");
        assert_eq!(
            normalize_url("https://foo.example.com"),
            "https://foo.example.com"
        );
        assert_eq!(
            normalize_url("http://foo.example.com"),
            "http://foo.example.com"
        );
    }

    #[test]
    fn test_map_remote_state() {
        assert_eq!(map_remote_state("READY"), DeploymentStatus::Ready);
        assert_eq!(map_remote_state("ready"), DeploymentStatus::Ready);
        assert_eq!(map_remote_state("ERROR"), DeploymentStatus::Error);
        assert_eq!(map_remote_state("CANCELED"), DeploymentStatus::Canceled);
        assert_eq!(map_remote_state("BUILDING"), DeploymentStatus::Building);
        assert_eq!(map_remote_state("QUEUED"), DeploymentStatus::Building);
        assert_eq!(map_remote_state("SOMETHING_NEW"), DeploymentStatus::Building);
    }

    #[test]
    fn test_status_from_webhook_type() {
        assert_eq!(
            status_from_webhook_type("deployment.ready"),
            Some(DeploymentStatus::Ready)
        );
        assert_eq!(
            status_from_webhook_type("deployment.succeeded"),
            Some(DeploymentStatus::Ready)
        );
        assert_eq!(
            status_from_webhook_type("deployment.failed"),
            Some(DeploymentStatus::Error)
        );
        assert_eq!(
            status_from_webhook_type("deployment.canceled"),
            Some(DeploymentStatus::Canceled)
        );
        assert_eq!(
            status_from_webhook_type("deployment.created"),
            Some(DeploymentStatus::Building)
        );
        assert_eq!(status_from_webhook_type("project.created"), None);
    }

    #[test]
    fn test_webhook_payload_deserializes() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{
                "type": "deployment.ready",
                "payload": {
                    "deployment": { "id": "dep_1", "url": "site.example.com", "state": "READY" },
                    "project": { "id": "prj_1" }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(payload.event_type, "deployment.ready");
        assert_eq!(payload.payload.deployment.unwrap().id, "dep_1");
        assert_eq!(payload.payload.project.unwrap().id, "prj_1");
    }
}
