use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::chain::BalanceSource;
use crate::db::ActivityStore;
use crate::errors::BotResult;
use crate::models::LeaderActivity;
use crate::sizing::{calculate_order_size, CopyStrategyConfig, SizedOrder};

/// Validation decision for one leader fill.
///
/// On `is_valid`, `sized` carries the sizing output so the engine does not
/// recompute it.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub reason: Option<String>,
    pub my_position: Option<Decimal>,
    pub user_position: Option<Decimal>,
    pub my_balance: Decimal,
    pub user_balance: Decimal,
    pub sized: Option<SizedOrder>,
}

impl ValidationOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
            my_position: None,
            user_position: None,
            my_balance: Decimal::ZERO,
            user_balance: Decimal::ZERO,
            sized: None,
        }
    }
}

/// Combines the sizing policy with freshness, marker, and duplicate checks.
pub struct TradeValidator {
    config: CopyStrategyConfig,
    max_activity_age: Duration,
}

impl TradeValidator {
    pub fn new(config: CopyStrategyConfig, max_activity_age: Duration) -> Self {
        Self {
            config,
            max_activity_age,
        }
    }

    pub fn config(&self) -> &CopyStrategyConfig {
        &self.config
    }

    pub async fn validate_trade(
        &self,
        store: &dyn ActivityStore,
        balance: &dyn BalanceSource,
        activity: &LeaderActivity,
        follower_address: &str,
    ) -> BotResult<ValidationOutcome> {
        // Cheap rejections first; none of these need I/O beyond the store.
        if !activity.marker.is_unseen() {
            return Ok(ValidationOutcome::rejected("Already processed"));
        }

        let age = activity.age_secs(Utc::now());
        if age > self.max_activity_age.as_secs() as i64 {
            return Ok(ValidationOutcome::rejected(format!(
                "Stale activity ({age}s old)"
            )));
        }

        if store
            .seen_tx_hash(&activity.tx_hash, &activity.id)
            .await?
        {
            return Ok(ValidationOutcome::rejected("Duplicate transaction"));
        }

        let my_balance = balance.get_balance(follower_address).await?;
        let my_position = store.position_size_usd(&activity.asset_id).await?;
        let (user_balance, user_position) = leader_profile_numbers(activity);

        let sized = calculate_order_size(
            &self.config,
            activity.usdc_size,
            my_balance,
            my_position,
        );

        if sized.final_amount.is_zero() {
            // A balance-forced reduction below the minimum reads as an
            // insufficient-balance reject; a plain small order as below-min.
            let reason = if sized.reduced_by_balance {
                "Insufficient balance"
            } else {
                "Below minimum"
            };
            tracing::debug!(
                activity_id = %activity.id,
                reasoning = ?sized.reasoning,
                "Sizing suppressed trade: {reason}"
            );
            return Ok(ValidationOutcome {
                is_valid: false,
                reason: Some(reason.into()),
                my_position: Some(my_position),
                user_position,
                my_balance,
                user_balance,
                sized: Some(sized),
            });
        }

        Ok(ValidationOutcome {
            is_valid: true,
            reason: None,
            my_position: Some(my_position),
            user_position,
            my_balance,
            user_balance,
            sized: Some(sized),
        })
    }
}

/// Leader balance/position ride along opaquely in the profile blob when the
/// feed includes them.
fn leader_profile_numbers(activity: &LeaderActivity) -> (Decimal, Option<Decimal>) {
    let Some(profile) = activity.profile.as_ref() else {
        return (Decimal::ZERO, None);
    };
    let read = |key: &str| -> Option<Decimal> {
        let v = profile.get(key)?;
        v.as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| v.as_f64().and_then(|f| Decimal::try_from(f).ok()))
    };
    (read("balance").unwrap_or(Decimal::ZERO), read("position"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::balance::FixedBalance;
    use crate::db::MemoryActivityStore;
    use crate::models::{ProcessingMarker, Side};
    use rust_decimal_macros::dec;

    fn activity(id: &str) -> LeaderActivity {
        LeaderActivity {
            id: id.into(),
            leader: "0xleader".into(),
            condition_id: "cond-1".into(),
            asset_id: "token-1".into(),
            side: Side::Buy,
            size: dec!(200),
            usdc_size: dec!(100),
            price: dec!(0.5),
            timestamp: Utc::now(),
            tx_hash: format!("0xtx-{id}"),
            marker: ProcessingMarker::Unseen,
            profile: None,
        }
    }

    fn validator() -> TradeValidator {
        TradeValidator::new(CopyStrategyConfig::default(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_valid_trade_carries_sizing() {
        let store = MemoryActivityStore::new();
        let balance = FixedBalance(dec!(500));
        let act = activity("a1");
        store.insert_new(&act).await.unwrap();

        let outcome = validator()
            .validate_trade(&store, &balance, &act, "0xme")
            .await
            .unwrap();
        assert!(outcome.is_valid);
        assert_eq!(outcome.my_balance, dec!(500));
        // Default config: 10% of $100
        assert_eq!(outcome.sized.unwrap().final_amount, dec!(10));
    }

    #[tokio::test]
    async fn test_non_unseen_marker_rejects() {
        let store = MemoryActivityStore::new();
        let balance = FixedBalance(dec!(500));
        let mut act = activity("a1");
        act.marker = ProcessingMarker::InFlight(123);

        let outcome = validator()
            .validate_trade(&store, &balance, &act, "0xme")
            .await
            .unwrap();
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason.as_deref(), Some("Already processed"));
    }

    #[tokio::test]
    async fn test_stale_activity_rejects() {
        let store = MemoryActivityStore::new();
        let balance = FixedBalance(dec!(500));
        let mut act = activity("a1");
        act.timestamp = Utc::now() - chrono::Duration::seconds(600);

        let outcome = validator()
            .validate_trade(&store, &balance, &act, "0xme")
            .await
            .unwrap();
        assert!(!outcome.is_valid);
        assert!(outcome.reason.unwrap().starts_with("Stale activity"));
    }

    #[tokio::test]
    async fn test_duplicate_tx_hash_rejects() {
        let store = MemoryActivityStore::new();
        let balance = FixedBalance(dec!(500));

        // A sibling activity with the same tx hash already completed
        let mut done = activity("a0");
        done.tx_hash = "0xsame".into();
        store.insert_new(&done).await.unwrap();
        store.try_claim("a0", 1).await.unwrap();
        store.mark_completed("a0", 2).await.unwrap();

        let mut act = activity("a1");
        act.tx_hash = "0xsame".into();
        store.insert_new(&act).await.unwrap();

        let outcome = validator()
            .validate_trade(&store, &balance, &act, "0xme")
            .await
            .unwrap();
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason.as_deref(), Some("Duplicate transaction"));
    }

    #[tokio::test]
    async fn test_below_minimum_reject_reason() {
        let store = MemoryActivityStore::new();
        let balance = FixedBalance(dec!(500));
        let mut act = activity("a1");
        act.usdc_size = dec!(5); // 10% of 5 = 0.5 < min 1

        let outcome = validator()
            .validate_trade(&store, &balance, &act, "0xme")
            .await
            .unwrap();
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason.as_deref(), Some("Below minimum"));
    }

    #[tokio::test]
    async fn test_insufficient_balance_reject_reason() {
        let store = MemoryActivityStore::new();
        // 10% of 100 = 10 > balance 0.5; haircut leaves 0.495 < min 1
        let balance = FixedBalance(dec!(0.5));
        let act = activity("a1");

        let outcome = validator()
            .validate_trade(&store, &balance, &act, "0xme")
            .await
            .unwrap();
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason.as_deref(), Some("Insufficient balance"));
    }

    #[tokio::test]
    async fn test_leader_profile_numbers_carried() {
        let store = MemoryActivityStore::new();
        let balance = FixedBalance(dec!(500));
        let mut act = activity("a1");
        act.profile = Some(serde_json::json!({"balance": "2500.5", "position": 80.0}));

        let outcome = validator()
            .validate_trade(&store, &balance, &act, "0xme")
            .await
            .unwrap();
        assert_eq!(outcome.user_balance, dec!(2500.5));
        assert_eq!(outcome.user_position, Some(dec!(80)));
    }
}
