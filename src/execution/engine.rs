use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;

use crate::chain::BalanceSource;
use crate::db::ActivityStore;
use crate::errors::{BotError, BotResult, RecoveryStrategy};
use crate::exchange::{OrderClient, OrderRequest};
use crate::execution::aggregator::{AggregationKey, Contribution, TradeAggregator};
use crate::execution::validator::TradeValidator;
use crate::models::LeaderActivity;

/// Drives validation, aggregation readiness, order posting, and the
/// persistence markers that make mirroring at-most-once.
///
/// Marker writes are this engine's exclusive responsibility (the aggregator
/// only sets the suppression flag). Per activity id, the CAS claim in the
/// store guarantees a single worker ever advances the marker past in-flight.
pub struct ExecutionEngine {
    store: Arc<dyn ActivityStore>,
    order_client: Arc<dyn OrderClient>,
    balance: Arc<dyn BalanceSource>,
    validator: TradeValidator,
    aggregator: Arc<TradeAggregator>,
    aggregation_enabled: bool,
    follower_address: String,
    shutdown: Arc<AtomicBool>,
}

impl ExecutionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ActivityStore>,
        order_client: Arc<dyn OrderClient>,
        balance: Arc<dyn BalanceSource>,
        validator: TradeValidator,
        aggregator: Arc<TradeAggregator>,
        aggregation_enabled: bool,
        follower_address: impl Into<String>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            order_client,
            balance,
            validator,
            aggregator,
            aggregation_enabled,
            follower_address: follower_address.into(),
            shutdown,
        }
    }

    pub fn aggregator(&self) -> &Arc<TradeAggregator> {
        &self.aggregator
    }

    /// Mirror one leader fill: claim, validate, then either buffer for
    /// aggregation or post directly.
    pub async fn execute_trade(&self, activity: &LeaderActivity) -> BotResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        if !self.store.try_claim(&activity.id, now_ms).await? {
            tracing::debug!(activity_id = %activity.id, "Activity already claimed, skipping");
            return Ok(());
        }

        let outcome = match self
            .validator
            .validate_trade(
                self.store.as_ref(),
                self.balance.as_ref(),
                activity,
                &self.follower_address,
            )
            .await
        {
            Ok(outcome) => outcome,
            // Validator failures never propagate; the activity is skipped
            // and a later fill gets a fresh attempt.
            Err(err) => {
                err.log(&format!("validate {}", activity.id), true);
                self.store.mark_skipped(&activity.id).await?;
                counter!("activities_skipped").increment(1);
                return Ok(());
            }
        };

        if !outcome.is_valid {
            let reason = outcome.reason.as_deref().unwrap_or("unknown");
            tracing::info!(
                activity_id = %activity.id,
                leader = %activity.leader,
                reason,
                "Trade rejected by validator"
            );
            self.store.mark_skipped(&activity.id).await?;
            counter!("activities_skipped").increment(1);
            return Ok(());
        }

        let sized = outcome.sized.expect("valid outcome always carries sizing");

        if self.aggregation_enabled {
            self.aggregator.add(
                AggregationKey {
                    leader: activity.leader.clone(),
                    condition_id: activity.condition_id.clone(),
                    asset_id: activity.asset_id.clone(),
                    side: activity.side,
                },
                Contribution {
                    activity_id: activity.id.clone(),
                    usdc_size: sized.final_amount,
                    price: activity.price,
                },
            );
            tracing::info!(
                activity_id = %activity.id,
                size = %sized.final_amount,
                buffered = self.aggregator.buffer_size(),
                "Trade buffered for aggregation"
            );
            return Ok(());
        }

        let request = OrderRequest {
            asset_id: activity.asset_id.clone(),
            side: activity.side,
            size: sized.final_amount,
            price: activity.price,
        };

        match self.order_client.post_order(&request).await {
            Ok(receipt) => {
                self.store
                    .record_fill(
                        &activity.id,
                        &activity.asset_id,
                        activity.side.as_str(),
                        sized.final_amount,
                        activity.price,
                    )
                    .await?;
                self.store
                    .mark_completed(&activity.id, Utc::now().timestamp_millis())
                    .await?;
                counter!("orders_mirrored").increment(1);
                tracing::info!(
                    activity_id = %activity.id,
                    order_id = ?receipt.order_id,
                    size = %sized.final_amount,
                    "Mirror order completed"
                );
                Ok(())
            }
            Err(err) => {
                counter!("orders_failed").increment(1);
                self.handle_order_error(&[activity.id.clone()], err).await
            }
        }
    }

    /// Drain the aggregator and post one order per ready bucket, then mark
    /// every contributing activity completed. The post always precedes the
    /// marker writes for its bucket.
    pub async fn execute_aggregated_trades(&self) -> BotResult<()> {
        let ready = self.aggregator.drain_ready(self.store.as_ref()).await?;

        for trade in ready {
            let request = OrderRequest {
                asset_id: trade.key.asset_id.clone(),
                side: trade.key.side,
                size: trade.total_usdc_size,
                price: trade.average_price,
            };

            tracing::info!(
                asset_id = %trade.key.asset_id,
                side = %trade.key.side,
                trades = trade.trade_count(),
                total = %trade.total_usdc_size,
                avg_price = %trade.average_price,
                "Posting aggregated order"
            );

            match self.order_client.post_order(&request).await {
                Ok(_) => {
                    let now_ms = Utc::now().timestamp_millis();
                    for c in &trade.contributions {
                        self.store
                            .record_fill(
                                &c.activity_id,
                                &trade.key.asset_id,
                                trade.key.side.as_str(),
                                c.usdc_size,
                                c.price,
                            )
                            .await?;
                        self.store.mark_completed(&c.activity_id, now_ms).await?;
                    }
                    counter!("orders_mirrored").increment(1);
                    counter!("aggregated_flushes").increment(1);
                }
                Err(err) => {
                    counter!("orders_failed").increment(1);
                    let ids: Vec<String> = trade
                        .contributions
                        .iter()
                        .map(|c| c.activity_id.clone())
                        .collect();
                    self.handle_order_error(&ids, err).await?;
                }
            }
        }
        Ok(())
    }

    /// Recovery policy for a failed post. Retryable failures leave the
    /// markers in-flight so a later run can reconcile; non-retryable ones
    /// skip; a critical non-retryable failure also trips process shutdown.
    async fn handle_order_error(&self, activity_ids: &[String], err: BotError) -> BotResult<()> {
        err.log(&format!("post order for {activity_ids:?}"), true);

        match err.recovery_strategy() {
            RecoveryStrategy::Retry | RecoveryStrategy::CircuitBreak => {
                tracing::warn!(
                    activities = activity_ids.len(),
                    "Order post failed retryably; markers stay in-flight for reconciliation"
                );
            }
            RecoveryStrategy::Skip => {
                for id in activity_ids {
                    self.store.mark_skipped(id).await?;
                }
                counter!("activities_skipped").increment(activity_ids.len() as u64);
            }
            RecoveryStrategy::Shutdown => {
                for id in activity_ids {
                    self.store.mark_skipped(id).await?;
                }
                tracing::error!(
                    code = %err.code,
                    "Critical non-retryable failure, requesting shutdown"
                );
                self.shutdown.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
