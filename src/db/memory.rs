use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::db::ActivityStore;
use crate::errors::BotResult;
use crate::models::{LeaderActivity, ProcessingMarker};

#[derive(Debug, Clone)]
struct FillRecord {
    asset_id: String,
    side: String,
    usd_size: Decimal,
}

#[derive(Default)]
struct MemoryState {
    activities: HashMap<String, LeaderActivity>,
    fills: Vec<FillRecord>,
    insertion_order: Vec<String>,
}

/// In-memory activity store for dry-run mode and tests.
///
/// Same contract as the Postgres store, including the marker CAS; nothing
/// survives a restart, which is fine when no orders ever reach the exchange.
#[derive(Default)]
pub struct MemoryActivityStore {
    state: Mutex<MemoryState>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current marker for an activity; test and reconcile helper.
    pub fn marker(&self, activity_id: &str) -> Option<ProcessingMarker> {
        let state = self.state.lock().unwrap();
        state.activities.get(activity_id).map(|a| a.marker)
    }

    /// Whether the aggregator suppressed this activity (`bot` flag).
    pub fn bot_flag(&self, activity_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .activities
            .get(activity_id)
            .and_then(|a| a.profile.as_ref())
            .and_then(|p| p.get("bot"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn fill_count(&self) -> usize {
        self.state.lock().unwrap().fills.len()
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn insert_new(&self, activity: &LeaderActivity) -> BotResult<bool> {
        let mut state = self.state.lock().unwrap();
        if state.activities.contains_key(&activity.id) {
            return Ok(false);
        }
        state.insertion_order.push(activity.id.clone());
        state
            .activities
            .insert(activity.id.clone(), activity.clone());
        Ok(true)
    }

    async fn unseen_activities(&self) -> BotResult<Vec<LeaderActivity>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .insertion_order
            .iter()
            .filter_map(|id| state.activities.get(id))
            .filter(|a| a.marker.is_unseen())
            .cloned()
            .collect())
    }

    async fn try_claim(&self, activity_id: &str, now_ms: i64) -> BotResult<bool> {
        let mut state = self.state.lock().unwrap();
        match state.activities.get_mut(activity_id) {
            Some(act) if act.marker.is_unseen() => {
                act.marker = ProcessingMarker::InFlight(now_ms);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_skipped(&self, activity_id: &str) -> BotResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(act) = state.activities.get_mut(activity_id) {
            act.marker = ProcessingMarker::Skipped;
        }
        Ok(())
    }

    async fn mark_completed(&self, activity_id: &str, now_ms: i64) -> BotResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(act) = state.activities.get_mut(activity_id) {
            act.marker = ProcessingMarker::Completed(now_ms);
        }
        Ok(())
    }

    async fn mark_aggregator_processed(&self, activity_id: &str) -> BotResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(act) = state.activities.get_mut(activity_id) {
            act.marker = ProcessingMarker::Skipped;
            let mut profile = act
                .profile
                .take()
                .unwrap_or_else(|| serde_json::json!({}));
            if let Some(obj) = profile.as_object_mut() {
                obj.insert("bot".into(), serde_json::Value::Bool(true));
            }
            act.profile = Some(profile);
        }
        Ok(())
    }

    async fn seen_tx_hash(&self, tx_hash: &str, excluding_id: &str) -> BotResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.activities.values().any(|a| {
            a.tx_hash == tx_hash && a.id != excluding_id && !a.marker.is_unseen()
        }))
    }

    async fn position_size_usd(&self, asset_id: &str) -> BotResult<Decimal> {
        let state = self.state.lock().unwrap();
        let sum: Decimal = state
            .fills
            .iter()
            .filter(|f| f.asset_id == asset_id)
            .map(|f| {
                if f.side == "BUY" {
                    f.usd_size
                } else {
                    -f.usd_size
                }
            })
            .sum();
        Ok(sum.max(Decimal::ZERO))
    }

    async fn record_fill(
        &self,
        _activity_id: &str,
        asset_id: &str,
        side: &str,
        usd_size: Decimal,
        _price: Decimal,
    ) -> BotResult<()> {
        let mut state = self.state.lock().unwrap();
        state.fills.push(FillRecord {
            asset_id: asset_id.to_string(),
            side: side.to_string(),
            usd_size,
        });
        Ok(())
    }
}
