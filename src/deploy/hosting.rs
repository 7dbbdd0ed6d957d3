//! REST client for the external hosting provider.
//!
//! Covers the calls the orchestrator needs: project create/list/get/rename,
//! environment variables, deployment create and latest-deployment lookup.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::generator::{FileContent, GeneratedProject};

/// A project as the hosting provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
}

/// A deployment as the hosting provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDeployment {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Provider state vocabulary: READY, ERROR, CANCELED, BUILDING, QUEUED, ...
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    projects: Vec<RemoteProject>,
}

#[derive(Debug, Deserialize)]
struct DeploymentList {
    deployments: Vec<RemoteDeployment>,
}

/// One file in a deployment-creation request.
#[derive(Debug, Serialize)]
struct DeploymentFile {
    file: String,
    data: String,
    encoding: &'static str,
}

/// Client for the hosting provider's versioned REST API.
#[derive(Clone)]
pub struct HostingClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HostingClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Create a project. A name collision surfaces as `AppError::Conflict` so
    /// the orchestrator can fall back to list-and-adopt.
    pub async fn create_project(&self, name: &str) -> Result<RemoteProject, AppError> {
        let response = self
            .http
            .post(format!("{}/v1/projects", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            reqwest::StatusCode::CONFLICT => Err(AppError::Conflict(format!(
                "Project '{}' already exists",
                name
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Upstream(format!(
                    "Project creation failed ({}): {}",
                    status, body
                )))
            }
        }
    }

    /// List all remote projects.
    pub async fn list_projects(&self) -> Result<Vec<RemoteProject>, AppError> {
        let response = self
            .http
            .get(format!("{}/v1/projects", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Upstream(format!(
                "Project list failed ({})",
                status
            )));
        }
        let list: ProjectList = response.json().await?;
        Ok(list.projects)
    }

    /// Get one project by id.
    pub async fn get_project(&self, project_id: &str) -> Result<RemoteProject, AppError> {
        let response = self
            .http
            .get(format!("{}/v1/projects/{}", self.base_url, project_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Upstream(format!(
                "Project fetch failed ({})",
                status
            )));
        }
        Ok(response.json().await?)
    }

    /// Rename a project.
    pub async fn rename_project(&self, project_id: &str, name: &str) -> Result<(), AppError> {
        let response = self
            .http
            .patch(format!("{}/v1/projects/{}", self.base_url, project_id))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Upstream(format!(
                "Project rename failed ({})",
                status
            )));
        }
        Ok(())
    }

    /// Set one environment variable on a project.
    pub async fn set_env_var(
        &self,
        project_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), AppError> {
        let response = self
            .http
            .post(format!("{}/v1/projects/{}/env", self.base_url, project_id))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "key": key, "value": value }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Upstream(format!(
                "Env var '{}' push failed ({})",
                key, status
            )));
        }
        Ok(())
    }

    /// Submit a generated file map as a new deployment of a project.
    pub async fn create_deployment(
        &self,
        project_id: &str,
        name: &str,
        project: &GeneratedProject,
    ) -> Result<RemoteDeployment, AppError> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let files: Vec<DeploymentFile> = project
            .files
            .iter()
            .map(|(path, content)| match content {
                FileContent::Text(text) => DeploymentFile {
                    file: path.clone(),
                    data: text.clone(),
                    encoding: "utf-8",
                },
                FileContent::Binary(bytes) => DeploymentFile {
                    file: path.clone(),
                    data: STANDARD.encode(bytes),
                    encoding: "base64",
                },
            })
            .collect();

        let response = self
            .http
            .post(format!("{}/v1/deployments", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "projectId": project_id,
                "name": name,
                "files": files,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Deployment creation failed ({}): {}",
                status, body
            )));
        }
        Ok(response.json().await?)
    }

    /// Most recent deployment of a project, if any.
    pub async fn latest_deployment(
        &self,
        project_id: &str,
    ) -> Result<Option<RemoteDeployment>, AppError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/deployments?projectId={}&limit=1",
                self.base_url, project_id
            ))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Upstream(format!(
                "Deployment list failed ({})",
                status
            )));
        }
        let list: DeploymentList = response.json().await?;
        Ok(list.deployments.into_iter().next())
    }
}
