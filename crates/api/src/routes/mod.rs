//! API routes

pub mod health;
pub mod payments;
pub mod users;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new().route("/health", get(health::health));

    let api_routes = Router::new()
        // Payments
        .route("/payments", post(payments::create_payment))
        .route("/payments/notification", post(payments::notification))
        .route("/payments/catalog", get(payments::catalog))
        .route("/payments/:order_id", get(payments::get_transaction))
        // Account reads
        .route("/users/:user_id/balance", get(users::get_balance))
        .route("/users/:user_id/subscription", get(users::get_subscription))
        .route("/users/:user_id/history", get(users::get_history))
        .route("/users/:user_id/usage", get(users::get_usage))
        .route("/users/:user_id/access/:feature_id", get(users::check_access));

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
