use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{BotError, BotResult};
use crate::models::Side;

/// A mirrored order ready to post.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub asset_id: String,
    pub side: Side,
    /// Order size in USDC.
    pub size: Decimal,
    /// Limit price in [0, 1].
    pub price: Decimal,
}

/// What the exchange said about a posted order. No partial-fill reporting
/// is modeled at this layer; orders are treated as atomic.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order_id: Option<String>,
    pub status: String,
}

/// Order-posting contract consumed by the execution engine.
#[async_trait]
pub trait OrderClient: Send + Sync {
    async fn post_order(&self, request: &OrderRequest) -> BotResult<OrderReceipt>;
}

#[derive(Debug, Deserialize)]
struct PostOrderResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, alias = "orderID", alias = "orderId")]
    order_id: Option<String>,
    #[serde(default, alias = "errorMsg")]
    error_msg: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Posts orders to the exchange CLOB over HTTP.
#[derive(Clone)]
pub struct ClobOrderClient {
    http: Client,
    base_url: String,
}

impl ClobOrderClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl OrderClient for ClobOrderClient {
    async fn post_order(&self, request: &OrderRequest) -> BotResult<OrderReceipt> {
        let url = format!("{}/order", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| BotError::network("ORDER_TRANSPORT", e.to_string()))?;

        let status = resp.status();
        let body: PostOrderResponse = resp
            .json()
            .await
            .map_err(|e| BotError::api("ORDER_BODY", e.to_string()))?;

        if !status.is_success() || !body.success {
            let msg = body
                .error_msg
                .unwrap_or_else(|| format!("order rejected with HTTP {status}"));
            // The exchange reports failures as free text; promote it so
            // e.g. "not enough balance" trips the funds handling.
            return Err(BotError::classify(anyhow::anyhow!("{msg}")));
        }

        tracing::info!(
            order_id = ?body.order_id,
            asset_id = %request.asset_id,
            side = %request.side,
            size = %request.size,
            price = %request.price,
            "Order submitted to CLOB"
        );

        Ok(OrderReceipt {
            order_id: body.order_id,
            status: body.status.unwrap_or_else(|| "live".into()),
        })
    }
}

/// Logs the order and reports success without touching the exchange.
/// Used when no live trading credentials are configured.
pub struct DryRunOrderClient;

#[async_trait]
impl OrderClient for DryRunOrderClient {
    async fn post_order(&self, request: &OrderRequest) -> BotResult<OrderReceipt> {
        tracing::info!(
            asset_id = %request.asset_id,
            side = %request.side,
            size = %request.size,
            price = %request.price,
            "[DRY-RUN] Would post order"
        );
        Ok(OrderReceipt {
            order_id: None,
            status: "dry-run".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        let client = DryRunOrderClient;
        let receipt = client
            .post_order(&OrderRequest {
                asset_id: "token-1".into(),
                side: Side::Buy,
                size: dec!(10),
                price: dec!(0.55),
            })
            .await
            .unwrap();
        assert!(receipt.order_id.is_none());
        assert_eq!(receipt.status, "dry-run");
    }
}
