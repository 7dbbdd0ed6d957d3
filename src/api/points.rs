//! Point rule and ledger API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{
    CreatePointRuleRequest, CreatePointTransactionRequest, PointRule, PointTransaction,
    UpdatePointRuleRequest,
};
use crate::AppState;

/// GET /api/points/rules - List all point rules.
pub async fn list_point_rules(
    State(state): State<AppState>,
) -> Result<Json<Vec<PointRule>>, AppError> {
    Ok(Json(state.repo.list_point_rules().await?))
}

/// GET /api/points/rules/:id - Get a single point rule.
pub async fn get_point_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PointRule>, AppError> {
    let rule = state
        .repo
        .get_point_rule(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Point rule {} not found", id)))?;
    Ok(Json(rule))
}

/// POST /api/points/rules - Create a point rule.
pub async fn create_point_rule(
    State(state): State<AppState>,
    Json(request): Json<CreatePointRuleRequest>,
) -> Result<(StatusCode, Json<PointRule>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if request.source.trim().is_empty() {
        return Err(AppError::Validation("Source is required".to_string()));
    }

    let rule = state.repo.create_point_rule(&request).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// PATCH /api/points/rules/:id - Partially update a point rule.
pub async fn update_point_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdatePointRuleRequest>,
) -> Result<Json<PointRule>, AppError> {
    let rule = state.repo.update_point_rule(&id, &request).await?;
    Ok(Json(rule))
}

/// DELETE /api/points/rules/:id - Delete a point rule. Existing ledger
/// entries are untouched.
pub async fn delete_point_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.delete_point_rule(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// Query parameters for the ledger listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// GET /api/points/transactions?userId= - List ledger entries, newest first.
pub async fn list_point_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<PointTransaction>>, AppError> {
    let transactions = state
        .repo
        .list_point_transactions(query.user_id.as_deref())
        .await?;
    Ok(Json(transactions))
}

/// POST /api/points/transactions - Append a ledger entry.
pub async fn create_point_transaction(
    State(state): State<AppState>,
    Json(request): Json<CreatePointTransactionRequest>,
) -> Result<(StatusCode, Json<PointTransaction>), AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }
    if request.tx_type.trim().is_empty() {
        return Err(AppError::Validation("txType is required".to_string()));
    }
    if request.source.trim().is_empty() {
        return Err(AppError::Validation("Source is required".to_string()));
    }

    let transaction = state.repo.create_point_transaction(&request).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}
