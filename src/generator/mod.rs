//! Project generator.
//!
//! Synthesizes a deployable static Next.js project from a site's persisted
//! content. Read-only: loads from the repository and returns an in-memory
//! file map, no network calls and no writes.

mod collectible;

pub use collectible::COLLECTIBLE_TEMPLATE;

use std::collections::BTreeMap;
use std::path::Path;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Asset, CardManifest, ContentItem, Site};

/// Content of one generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    #[allow(dead_code)]
    Binary(Vec<u8>),
}

impl FileContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(s) => Some(s),
            FileContent::Binary(_) => None,
        }
    }
}

/// A generated project: mapping from relative file path to file content.
#[derive(Debug, Clone, Default)]
pub struct GeneratedProject {
    pub files: BTreeMap<String, FileContent>,
}

impl GeneratedProject {
    pub fn insert_text(&mut self, path: &str, content: String) {
        self.files.insert(path.to_string(), FileContent::Text(content));
    }
}

/// Everything the generator reads for one site.
#[derive(Debug, Clone)]
pub struct SiteBundle {
    pub site: Site,
    pub content: Vec<ContentItem>,
    /// Fetched for parity with deployment packaging; not rendered today.
    pub assets: Vec<Asset>,
    pub active_card: Option<CardManifest>,
}

impl SiteBundle {
    /// Visible content of one section, ascending by order.
    ///
    /// `list_content` already sorts by (section, order), so filtering keeps
    /// the ordering invariant.
    pub fn section(&self, section: &str) -> Vec<&ContentItem> {
        self.content
            .iter()
            .filter(|c| c.visible && c.section == section)
            .collect()
    }
}

/// Resolve the template name a site generates with.
///
/// A template is resolvable from its database row or from a matching on-disk
/// directory under `templates_dir`.
async fn resolve_template_name(
    repo: &Repository,
    templates_dir: &Path,
    template_id: &str,
) -> Result<String, AppError> {
    if let Some(template) = repo.get_template(template_id).await? {
        return Ok(template.name);
    }
    let candidate = templates_dir.join(template_id);
    if tokio::fs::metadata(&candidate)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Ok(template_id.to_string());
    }
    Err(AppError::NotFound(format!(
        "Template {} not found",
        template_id
    )))
}

/// Generate the deployable file map for a site.
///
/// Fatal errors: site missing, no template assigned, template unresolvable,
/// template name without a generation strategy. No partial results.
pub async fn generate_project(
    repo: &Repository,
    templates_dir: &Path,
    site_id: &str,
) -> Result<GeneratedProject, AppError> {
    let site = repo
        .get_site(site_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Site {} not found", site_id)))?;

    let template_id = site.template_id.clone().ok_or_else(|| {
        AppError::Validation(format!("Site '{}' has no template assigned", site.name))
    })?;

    let template_name = resolve_template_name(repo, templates_dir, &template_id).await?;

    let content = repo.list_content(site_id).await?;
    let assets = repo.list_assets(site_id).await?;
    let active_card = repo.first_active_card(site_id).await?;

    let bundle = SiteBundle {
        site,
        content,
        assets,
        active_card,
    };

    match template_name.as_str() {
        COLLECTIBLE_TEMPLATE => Ok(collectible::generate(&bundle)),
        other => Err(AppError::Validation(format!(
            "No generation strategy for template '{}'",
            other
        ))),
    }
}
