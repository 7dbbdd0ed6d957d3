//! Card manifest API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::require_site;
use crate::errors::AppError;
use crate::models::{CardManifest, CreateCardRequest, UpdateCardRequest};
use crate::AppState;

/// GET /api/sites/:id/cards - List a site's card manifests.
pub async fn list_cards(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<Vec<CardManifest>>, AppError> {
    require_site(&state.repo, &site_id).await?;
    Ok(Json(state.repo.list_cards(&site_id).await?))
}

/// POST /api/sites/:id/cards - Create a card manifest.
pub async fn create_card(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Json(request): Json<CreateCardRequest>,
) -> Result<(StatusCode, Json<CardManifest>), AppError> {
    require_site(&state.repo, &site_id).await?;
    request.manifest.validate()?;

    let card = state.repo.create_card(&site_id, &request).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

/// GET /api/cards/:id - Get a single card manifest.
pub async fn get_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CardManifest>, AppError> {
    let card = state
        .repo
        .get_card(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Card manifest {} not found", id)))?;
    Ok(Json(card))
}

/// PATCH /api/cards/:id - Partially update a card manifest.
pub async fn update_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCardRequest>,
) -> Result<Json<CardManifest>, AppError> {
    if let Some(manifest) = &request.manifest {
        manifest.validate()?;
    }
    let card = state.repo.update_card(&id, &request).await?;
    Ok(Json(card))
}

/// DELETE /api/cards/:id - Delete a card manifest.
pub async fn delete_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.delete_card(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
