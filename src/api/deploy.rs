//! Deployment API endpoints: trigger, status reconciliation and the hosting
//! provider's webhook.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::deploy::WebhookPayload;
use crate::errors::AppError;
use crate::models::Site;
use crate::AppState;

/// POST /api/sites/:id/deploy - Generate the site and push it to hosting.
pub async fn deploy_site(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<(StatusCode, Json<Site>), AppError> {
    let site = state.deploy.deploy_site(&site_id).await?;
    Ok((StatusCode::ACCEPTED, Json(site)))
}

/// GET /api/sites/:id/deployment - Reconcile and return deployment status.
pub async fn deployment_status(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<Site>, AppError> {
    let site = state.deploy.reconcile_status(&site_id).await?;
    Ok(Json(site))
}

/// POST /api/webhooks/deployment - Hosting provider status callback.
///
/// Unauthenticated by design; always acknowledges with 200 so the provider
/// does not retry events we cannot attribute to a site.
pub async fn deployment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.deploy.handle_webhook(&payload).await?;
    Ok(Json(serde_json::json!({ "received": true })))
}
