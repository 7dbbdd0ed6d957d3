//! Content item API endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::require_site;
use crate::errors::AppError;
use crate::models::{ContentItem, CreateContentRequest, UpdateContentRequest};
use crate::AppState;

/// GET /api/sites/:id/content - List a site's content grouped by section,
/// each group ascending by order.
pub async fn list_content(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<BTreeMap<String, Vec<ContentItem>>>, AppError> {
    require_site(&state.repo, &site_id).await?;

    let items = state.repo.list_content(&site_id).await?;
    let mut grouped: BTreeMap<String, Vec<ContentItem>> = BTreeMap::new();
    for item in items {
        grouped.entry(item.section.clone()).or_default().push(item);
    }
    Ok(Json(grouped))
}

/// POST /api/sites/:id/content - Create a content item.
pub async fn create_content(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Json(request): Json<CreateContentRequest>,
) -> Result<(StatusCode, Json<ContentItem>), AppError> {
    require_site(&state.repo, &site_id).await?;

    if request.section.trim().is_empty() {
        return Err(AppError::Validation("Section is required".to_string()));
    }
    request.body.validate()?;

    let item = state.repo.create_content(&site_id, &request).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /api/content/:id - Get a single content item.
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContentItem>, AppError> {
    let item = state
        .repo
        .get_content(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Content item {} not found", id)))?;
    Ok(Json(item))
}

/// PATCH /api/content/:id - Partially update a content item.
pub async fn update_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateContentRequest>,
) -> Result<Json<ContentItem>, AppError> {
    if let Some(body) = &request.body {
        body.validate()?;
    }
    let item = state.repo.update_content(&id, &request).await?;
    Ok(Json(item))
}

/// DELETE /api/content/:id - Delete a content item.
pub async fn delete_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.delete_content(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
