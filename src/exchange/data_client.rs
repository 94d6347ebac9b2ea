use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::{BotError, BotResult};
use crate::models::{LeaderActivity, ProcessingMarker, Side};
use crate::net::RetryingFetcher;
use crate::resilience::{BreakerRegistry, CircuitBreaker};

/// One fill from the exchange activity feed. Field names vary across API
/// versions; aliases cover the shapes seen in the wild.
#[derive(Debug, Clone, Deserialize)]
struct WireActivity {
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default, alias = "proxyWallet", alias = "user")]
    wallet: Option<String>,
    #[serde(default, alias = "conditionId", alias = "market")]
    condition_id: Option<String>,
    #[serde(default, alias = "asset", alias = "tokenId")]
    asset_id: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    size: Option<Decimal>,
    #[serde(default, alias = "usdcSize")]
    usdc_size: Option<Decimal>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default, alias = "transactionHash")]
    tx_hash: Option<String>,
    /// Leader profile extras (name, pseudonym, balances); carried opaquely.
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Fetches leader fills from the exchange data API through the retrying
/// fetcher, under the shared "data-api" breaker.
#[derive(Clone)]
pub struct DataClient {
    fetcher: RetryingFetcher,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
}

impl DataClient {
    pub fn new(
        fetcher: RetryingFetcher,
        base_url: impl Into<String>,
        registry: &BreakerRegistry,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            breaker: registry.get("data-api", None),
        }
    }

    /// Recent fills for one leader, newest first as the API returns them.
    pub async fn get_leader_activities(
        &self,
        leader: &str,
        limit: u32,
    ) -> BotResult<Vec<LeaderActivity>> {
        let url = format!(
            "{}/activity?user={}&type=TRADE&limit={}",
            self.base_url, leader, limit
        );

        let body = self.breaker.call(|| self.fetcher.get(&url)).await?;

        let wire: Vec<WireActivity> = serde_json::from_str(&body)
            .map_err(|e| BotError::api("ACTIVITY_PARSE", format!("bad activity feed: {e}")))?;

        Ok(wire
            .into_iter()
            .filter_map(|w| into_activity(w, leader))
            .collect())
    }
}

/// Convert a wire record, dropping rows without the fields a mirror needs.
fn into_activity(wire: WireActivity, leader: &str) -> Option<LeaderActivity> {
    let side = Side::from_api_str(wire.side.as_deref()?)?;
    let asset_id = wire.asset_id?;
    let condition_id = wire.condition_id.unwrap_or_default();
    let tx_hash = wire.tx_hash.unwrap_or_default();

    let size = wire.size.unwrap_or(Decimal::ZERO);
    let price = wire.price.unwrap_or(Decimal::ZERO);
    let usdc_size = wire.usdc_size.unwrap_or_else(|| size * price);

    // Feeds without a stable id get a synthetic one; tx hash + asset + side
    // is unique per fill batch.
    let id = wire
        .id
        .unwrap_or_else(|| format!("{tx_hash}-{asset_id}-{side}"));

    let timestamp = parse_activity_timestamp(wire.timestamp.as_ref()).unwrap_or_else(Utc::now);

    let profile = if wire.extra.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(wire.extra))
    };

    Some(LeaderActivity {
        id,
        leader: wire.wallet.unwrap_or_else(|| leader.to_string()),
        condition_id,
        asset_id,
        side,
        size,
        usdc_size,
        price,
        timestamp,
        tx_hash,
        marker: ProcessingMarker::Unseen,
        profile,
    })
}

/// Timestamps arrive as epoch seconds, epoch millis, or RFC 3339 strings.
fn parse_activity_timestamp(ts: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    ts.and_then(|t| match t {
        serde_json::Value::Number(n) => {
            let secs = n.as_i64()?;
            if secs > 1_000_000_000_000 {
                DateTime::from_timestamp(secs / 1000, ((secs % 1000) * 1_000_000) as u32)
            } else {
                DateTime::from_timestamp(secs, 0)
            }
        }
        serde_json::Value::String(s) => {
            if let Ok(secs) = s.parse::<i64>() {
                if secs > 1_000_000_000_000 {
                    return DateTime::from_timestamp(
                        secs / 1000,
                        ((secs % 1000) * 1_000_000) as u32,
                    );
                }
                return DateTime::from_timestamp(secs, 0);
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_wire_parse_full_record() {
        let raw = r#"{
            "_id": "act-1",
            "proxyWallet": "0xleader",
            "conditionId": "cond-9",
            "asset": "token-42",
            "side": "BUY",
            "size": "100",
            "usdcSize": "55",
            "price": "0.55",
            "timestamp": 1700000000,
            "transactionHash": "0xabc",
            "name": "whale.eth",
            "profileImage": "x.png"
        }"#;
        let wire: WireActivity = serde_json::from_str(raw).unwrap();
        let act = into_activity(wire, "0xleader").unwrap();
        assert_eq!(act.id, "act-1");
        assert_eq!(act.leader, "0xleader");
        assert_eq!(act.condition_id, "cond-9");
        assert_eq!(act.asset_id, "token-42");
        assert_eq!(act.side, Side::Buy);
        assert_eq!(act.usdc_size, dec!(55));
        assert_eq!(act.timestamp.timestamp(), 1_700_000_000);
        assert!(act.marker.is_unseen());
        // Profile extras survive opaquely
        let profile = act.profile.unwrap();
        assert_eq!(profile["name"], "whale.eth");
    }

    #[test]
    fn test_wire_parse_fills_in_gaps() {
        let raw = r#"{
            "asset": "token-1",
            "side": "SELL",
            "size": "200",
            "price": "0.25",
            "timestamp": "1700000000500",
            "transactionHash": "0xdef"
        }"#;
        let wire: WireActivity = serde_json::from_str(raw).unwrap();
        let act = into_activity(wire, "0xfallback").unwrap();
        assert_eq!(act.leader, "0xfallback");
        // usdc size derived from size * price
        assert_eq!(act.usdc_size, dec!(50.00));
        // synthetic id from tx hash
        assert_eq!(act.id, "0xdef-token-1-SELL");
        assert_eq!(act.timestamp.timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn test_wire_parse_drops_unusable_rows() {
        let wire: WireActivity = serde_json::from_str(r#"{"side": "HOLD"}"#).unwrap();
        assert!(into_activity(wire, "l").is_none());
        let wire: WireActivity = serde_json::from_str(r#"{"side": "BUY"}"#).unwrap();
        assert!(into_activity(wire, "l").is_none());
    }

    #[test]
    fn test_timestamp_formats() {
        let v = serde_json::json!(1_700_000_000);
        assert_eq!(
            parse_activity_timestamp(Some(&v)).unwrap().timestamp(),
            1_700_000_000
        );
        let v = serde_json::json!("2023-11-14T22:13:20Z");
        assert_eq!(
            parse_activity_timestamp(Some(&v)).unwrap().timestamp(),
            1_700_000_000
        );
        assert!(parse_activity_timestamp(Some(&serde_json::json!(null))).is_none());
        assert!(parse_activity_timestamp(None).is_none());
    }
}
