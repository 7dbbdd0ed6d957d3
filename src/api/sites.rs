//! Site API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::errors::AppError;
use crate::models::{CreateSiteRequest, Site, UpdateSiteRequest};
use crate::AppState;

/// GET /api/sites - List all sites.
pub async fn list_sites(State(state): State<AppState>) -> Result<Json<Vec<Site>>, AppError> {
    Ok(Json(state.repo.list_sites().await?))
}

/// GET /api/sites/:id - Get a single site.
pub async fn get_site(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Site>, AppError> {
    let site = state
        .repo
        .get_site(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Site {} not found", id)))?;
    Ok(Json(site))
}

/// Slugs become URL segments and npm package names in generated projects.
fn validate_slug(slug: &str) -> Result<(), AppError> {
    if slug.trim().is_empty() {
        return Err(AppError::Validation("Slug is required".to_string()));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AppError::Validation(
            "Slug may only contain lowercase letters, digits and hyphens".to_string(),
        ));
    }
    Ok(())
}

async fn require_template(state: &AppState, template_id: &str) -> Result<(), AppError> {
    if state.repo.get_template(template_id).await?.is_none() {
        return Err(AppError::Validation(format!(
            "Template {} does not exist",
            template_id
        )));
    }
    Ok(())
}

/// POST /api/sites - Create a new site.
pub async fn create_site(
    State(state): State<AppState>,
    Json(request): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<Site>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if request.display_name.trim().is_empty() {
        return Err(AppError::Validation("Display name is required".to_string()));
    }
    validate_slug(&request.slug)?;
    if let Some(template_id) = &request.template_id {
        require_template(&state, template_id).await?;
    }

    let site = state.repo.create_site(&request).await?;
    Ok((StatusCode::CREATED, Json(site)))
}

/// PATCH /api/sites/:id - Partially update a site.
///
/// Applies the same slug and template validation as create.
pub async fn update_site(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateSiteRequest>,
) -> Result<Json<Site>, AppError> {
    if let Some(slug) = &request.slug {
        validate_slug(slug)?;
    }
    if let Some(template_id) = &request.template_id {
        require_template(&state, template_id).await?;
    }
    let site = state.repo.update_site(&id, &request).await?;
    Ok(Json(site))
}

/// DELETE /api/sites/:id - Delete a site and its content, assets and cards.
pub async fn delete_site(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.delete_site(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
