//! Template API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::errors::AppError;
use crate::models::{CreateTemplateRequest, Template, UpdateTemplateRequest};
use crate::AppState;

/// GET /api/templates - List all templates.
pub async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<Template>>, AppError> {
    Ok(Json(state.repo.list_templates().await?))
}

/// GET /api/templates/:id - Get a single template.
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Template>, AppError> {
    let template = state
        .repo
        .get_template(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Template {} not found", id)))?;
    Ok(Json(template))
}

/// POST /api/templates - Create a template.
pub async fn create_template(
    State(state): State<AppState>,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let template = state.repo.create_template(&request).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// PATCH /api/templates/:id - Partially update a template.
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTemplateRequest>,
) -> Result<Json<Template>, AppError> {
    if let Some(name) = &request.name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("Name cannot be empty".to_string()));
        }
    }
    let template = state.repo.update_template(&id, &request).await?;
    Ok(Json(template))
}

/// DELETE /api/templates/:id - Delete a template. Sites referencing it keep
/// working; their template_id is cleared by the schema.
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.delete_template(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
