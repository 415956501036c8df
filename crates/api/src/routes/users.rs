//! Account read routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quanta_billing::{AccessDecision, DenialReason, SubscriptionStatus};
use quanta_shared::{LedgerEntry, UsageRecord};

use crate::{error::ApiResult, state::AppState};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub tokens: i64,
}

/// Current token balance
pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<BalanceResponse>> {
    let tokens = state.ledger.balance(user_id).await?;
    Ok(Json(BalanceResponse { user_id, tokens }))
}

/// Resolved premium status; deactivates a lapsed subscription on read
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionStatus>> {
    let status = state.subscriptions.resolve_status(user_id).await?;
    Ok(Json(status))
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<LedgerEntry>,
}

/// Recent ledger entries, newest first
pub async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let entries = state.ledger.history(user_id, query.limit()).await?;
    Ok(Json(HistoryResponse { entries }))
}

#[derive(Serialize)]
pub struct UsageResponse {
    pub usage: Vec<UsageRecord>,
}

/// Recent feature usage records, newest first
pub async fn get_usage(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<UsageResponse>> {
    let usage = state.ledger.usage_history(user_id, query.limit()).await?;
    Ok(Json(UsageResponse { usage }))
}

#[derive(Serialize)]
pub struct AccessResponse {
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialReason>,
}

/// Entitlement check for a feature; advisory, reserves nothing
pub async fn check_access(
    State(state): State<AppState>,
    Path((user_id, feature_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<AccessResponse>> {
    let decision = state.gate.authorize(user_id, &feature_id).await?;
    let response = match decision {
        AccessDecision::Granted => AccessResponse {
            granted: true,
            denial: None,
        },
        AccessDecision::Denied(reason) => AccessResponse {
            granted: false,
            denial: Some(reason),
        },
    };
    Ok(Json(response))
}
