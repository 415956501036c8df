//! Payment gateway client
//!
//! Creates hosted checkout sessions against a Snap-style gateway API. The
//! trait seam keeps the reconciler testable without network access.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::error::{BillingError, BillingResult};

const SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com/snap/v1/transactions";
const PRODUCTION_SNAP_URL: &str = "https://app.midtrans.com/snap/v1/transactions";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Shared server secret; authenticates outbound calls and signs inbound
    /// notifications
    pub server_key: String,
    pub production: bool,
    /// Base URL for the payer-facing redirect callbacks
    pub callback_base_url: String,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    fn snap_url(&self) -> &'static str {
        if self.production {
            PRODUCTION_SNAP_URL
        } else {
            SANDBOX_SNAP_URL
        }
    }
}

/// What the reconciler needs to open a hosted checkout
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub order_id: String,
    pub gross_amount: i64,
    pub item_id: String,
    pub item_name: String,
    pub customer_email: String,
    pub customer_name: String,
}

/// Redirect/session token returned by the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySession {
    pub token: String,
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> BillingResult<GatewaySession>;
}

#[derive(Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    customer_details: CustomerDetails<'a>,
    item_details: Vec<ItemDetails<'a>>,
    callbacks: Callbacks,
}

#[derive(Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
    email: &'a str,
    first_name: &'a str,
}

#[derive(Serialize)]
struct ItemDetails<'a> {
    id: &'a str,
    price: i64,
    quantity: u32,
    name: &'a str,
}

#[derive(Serialize)]
struct Callbacks {
    finish: String,
    error: String,
    pending: String,
}

/// HTTP gateway client with timeout and exponential-backoff retry
pub struct SnapGateway {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl SnapGateway {
    pub fn new(config: GatewayConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BillingError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { http, config })
    }

    async fn post_session(&self, request: &SessionRequest) -> BillingResult<GatewaySession> {
        let base = &self.config.callback_base_url;
        let body = SnapRequest {
            transaction_details: TransactionDetails {
                order_id: &request.order_id,
                gross_amount: request.gross_amount,
            },
            customer_details: CustomerDetails {
                email: &request.customer_email,
                first_name: &request.customer_name,
            },
            item_details: vec![ItemDetails {
                id: &request.item_id,
                price: request.gross_amount,
                quantity: 1,
                name: &request.item_name,
            }],
            callbacks: Callbacks {
                finish: format!("{base}/payment/success"),
                error: format!("{base}/payment/error"),
                pending: format!("{base}/payment/pending"),
            },
        };

        let response = self
            .http
            .post(self.config.snap_url())
            .basic_auth(&self.config.server_key, None::<&str>)
            .json(&body)
            .send()
            .await
            .map_err(|e| BillingError::GatewayUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(
                order_id = %request.order_id,
                status = %status,
                detail = %detail,
                "Gateway session creation failed"
            );
            return Err(BillingError::GatewayUnavailable(format!(
                "gateway returned {status}"
            )));
        }

        response
            .json::<GatewaySession>()
            .await
            .map_err(|e| BillingError::GatewayUnavailable(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for SnapGateway {
    async fn create_session(&self, request: &SessionRequest) -> BillingResult<GatewaySession> {
        let strategy = ExponentialBackoff::from_millis(250).map(jitter).take(2);
        Retry::spawn(strategy, || self.post_session(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_url_selection() {
        let mut config = GatewayConfig {
            server_key: "k".into(),
            production: false,
            callback_base_url: "http://localhost:3000".into(),
            request_timeout: Duration::from_secs(10),
        };
        assert_eq!(config.snap_url(), SANDBOX_SNAP_URL);
        config.production = true;
        assert_eq!(config.snap_url(), PRODUCTION_SNAP_URL);
    }
}
