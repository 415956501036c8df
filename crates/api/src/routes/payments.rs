//! Payment routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quanta_billing::{CreatedPayment, NotificationOutcome, NotificationPayload, PaymentRequest};
use quanta_shared::{
    catalog, FeatureConfig, PaymentTransaction, SubscriptionPlan, TokenPackage, TransactionKind,
};

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    /// Plan key (`monthly`/`yearly`) or token package key
    pub item: String,
}

/// Open a payment transaction and a hosted checkout session
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<CreatedPayment>)> {
    let created = state
        .reconciler
        .create_payment(
            request.user_id,
            PaymentRequest {
                kind: request.kind,
                item: request.item,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Gateway settlement webhook.
///
/// Unauthenticated; the reconciler verifies the payload signature before
/// touching any state.
pub async fn notification(
    State(state): State<AppState>,
    Json(payload): Json<NotificationPayload>,
) -> ApiResult<Json<NotificationOutcome>> {
    let outcome = state.reconciler.handle_notification(payload).await?;
    Ok(Json(outcome))
}

/// Look up a payment transaction by order id
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<PaymentTransaction>> {
    let txn = state.reconciler.transaction(&order_id).await?;
    Ok(Json(txn))
}

#[derive(Serialize)]
pub struct CatalogResponse {
    pub features: &'static [FeatureConfig],
    pub plans: &'static [SubscriptionPlan],
    pub packages: &'static [TokenPackage],
}

/// The purchasable catalog: features, subscription plans, token packages
pub async fn catalog() -> Json<CatalogResponse> {
    Json(CatalogResponse {
        features: catalog::FEATURES,
        plans: catalog::SUBSCRIPTION_PLANS,
        packages: catalog::TOKEN_PACKAGES,
    })
}
