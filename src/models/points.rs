//! Reward-system models: point rules and the immutable transaction ledger.

use serde::{Deserialize, Serialize};

/// A named point award tied to a source category (e.g. "event_checkin").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointRule {
    pub id: String,
    pub name: String,
    pub points: i64,
    pub source: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a point rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePointRuleRequest {
    pub name: String,
    pub points: i64,
    pub source: String,
}

/// Request body for partially updating a point rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePointRuleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
}

/// An immutable ledger entry; never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTransaction {
    pub id: String,
    pub user_id: String,
    /// Signed point delta.
    pub delta: i64,
    pub tx_type: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

/// Request body for appending a point transaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePointTransactionRequest {
    pub user_id: String,
    pub delta: i64,
    pub tx_type: String,
    pub source: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}
