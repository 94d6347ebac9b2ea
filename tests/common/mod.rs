use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use mirrorbot::errors::{BotError, BotResult};
use mirrorbot::exchange::{OrderClient, OrderReceipt, OrderRequest};
use mirrorbot::models::{LeaderActivity, ProcessingMarker, Side};

/// Order client double: records every request, optionally failing each post
/// with a canned error.
#[derive(Default)]
pub struct RecordingOrderClient {
    requests: Mutex<Vec<OrderRequest>>,
    fail_with: Mutex<Option<BotError>>,
}

impl RecordingOrderClient {
    pub fn failing(err: BotError) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_with: Mutex::new(Some(err)),
        }
    }

    pub fn posted(&self) -> Vec<OrderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Let subsequent posts succeed.
    pub fn heal(&self) {
        *self.fail_with.lock().unwrap() = None;
    }
}

#[async_trait]
impl OrderClient for RecordingOrderClient {
    async fn post_order(&self, request: &OrderRequest) -> BotResult<OrderReceipt> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(OrderReceipt {
            order_id: Some(format!("ord-{}", self.requests.lock().unwrap().len())),
            status: "live".into(),
        })
    }
}

pub fn leader_fill(id: &str, leader: &str, asset: &str, usdc: Decimal, price: Decimal) -> LeaderActivity {
    LeaderActivity {
        id: id.into(),
        leader: leader.into(),
        condition_id: "cond-1".into(),
        asset_id: asset.into(),
        side: Side::Buy,
        size: if price.is_zero() { dec!(0) } else { usdc / price },
        usdc_size: usdc,
        price,
        timestamp: Utc::now(),
        tx_hash: format!("0xtx-{id}"),
        marker: ProcessingMarker::Unseen,
        profile: None,
    }
}
