//! Asset API endpoints: server-proxied upload, direct-upload token flow, and
//! the storage completion callback.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::require_site;
use crate::errors::AppError;
use crate::models::{Asset, CompleteUploadRequest};
use crate::AppState;

/// Upper bound for the server-proxied upload path.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// GET /api/sites/:id/assets - List a site's assets.
pub async fn list_assets(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<Vec<Asset>>, AppError> {
    require_site(&state.repo, &site_id).await?;
    Ok(Json(state.repo.list_assets(&site_id).await?))
}

/// GET /api/assets/:id - Get a single asset.
pub async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Asset>, AppError> {
    let asset = state
        .repo
        .get_asset(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", id)))?;
    Ok(Json(asset))
}

/// POST /api/sites/:id/assets/upload - Server-proxied multipart upload.
pub async fn upload_asset(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Asset>), AppError> {
    require_site(&state.repo, &site_id).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::Validation("Uploaded file needs a filename".to_string()))?;
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                mime_guess::from_path(&filename)
                    .first_or_octet_stream()
                    .to_string()
            });

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation(format!(
                "Upload exceeds {} bytes",
                MAX_UPLOAD_BYTES
            )));
        }

        let size = bytes.len() as i64;
        let url = state
            .storage
            .put(&site_id, &filename, &content_type, bytes.to_vec())
            .await?;

        let asset = state
            .repo
            .create_asset(&site_id, &url, &filename, &content_type, Some(size))
            .await?;
        return Ok((StatusCode::CREATED, Json(asset)));
    }

    Err(AppError::Validation(
        "Multipart field 'file' is required".to_string(),
    ))
}

/// Request body for issuing a direct-upload token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTokenRequest {
    pub filename: String,
}

/// Response for a direct-upload token: the browser PUTs to `uploadUrl` and
/// then reports back via the completion callback with `token`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTokenResponse {
    pub token: String,
    pub upload_url: String,
}

/// POST /api/sites/:id/assets/upload-token - Issue a direct-upload token.
pub async fn issue_upload_token(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Json(request): Json<UploadTokenRequest>,
) -> Result<Json<UploadTokenResponse>, AppError> {
    require_site(&state.repo, &site_id).await?;

    if request.filename.trim().is_empty() {
        return Err(AppError::Validation("Filename is required".to_string()));
    }
    if request.filename.contains('/') || request.filename.contains("..") {
        return Err(AppError::Validation(
            "Filename must not contain path separators".to_string(),
        ));
    }

    let token = state.storage.issue_upload_token(&site_id, &request.filename);
    let upload_url = state.storage.direct_upload_url(&site_id, &request.filename);
    Ok(Json(UploadTokenResponse { token, upload_url }))
}

/// POST /api/assets/upload-complete - Storage completion callback for direct
/// uploads. Verifies the token, then records or updates the asset row; the
/// byte size may only become known here.
pub async fn complete_upload(
    State(state): State<AppState>,
    Json(request): Json<CompleteUploadRequest>,
) -> Result<(StatusCode, Json<Asset>), AppError> {
    let grant = state.storage.verify_upload_token(&request.token)?;

    if let Some(existing) = state.repo.find_asset_by_url(&request.url).await? {
        // The token only grants (site, filename); it must not update rows it
        // was not issued for.
        if existing.site_id != grant.site_id || existing.filename != grant.filename {
            return Err(AppError::Validation(
                "Upload token does not match this asset".to_string(),
            ));
        }
        if let Some(size) = request.size {
            state.repo.update_asset_size(&existing.id, size).await?;
        }
        let asset = state
            .repo
            .get_asset(&existing.id)
            .await?
            .ok_or_else(|| AppError::Internal("Asset vanished during update".to_string()))?;
        return Ok((StatusCode::OK, Json(asset)));
    }

    require_site(&state.repo, &grant.site_id).await?;

    let content_type = request.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(&grant.filename)
            .first_or_octet_stream()
            .to_string()
    });

    let asset = state
        .repo
        .create_asset(
            &grant.site_id,
            &request.url,
            &grant.filename,
            &content_type,
            request.size,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

/// DELETE /api/assets/:id - Delete an asset.
///
/// The blob is removed first as a non-critical step; a storage failure is
/// logged and the row is deleted anyway, leaving reconciliation to the
/// operator.
pub async fn delete_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let asset = state
        .repo
        .get_asset(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", id)))?;

    if let Err(e) = state.storage.delete(&asset.url).await {
        tracing::warn!(asset_id = %id, error = %e, "failed to delete blob, removing row anyway");
    }

    state.repo.delete_asset(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
