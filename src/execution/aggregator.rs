use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

use crate::db::ActivityStore;
use crate::errors::BotResult;
use crate::models::Side;

/// Merge eligibility: same leader, market, outcome token, and side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationKey {
    pub leader: String,
    pub condition_id: String,
    pub asset_id: String,
    pub side: Side,
}

/// One validated intent waiting in a bucket.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub activity_id: String,
    pub usdc_size: Decimal,
    pub price: Decimal,
}

/// A drained bucket ready to post as a single order.
#[derive(Debug, Clone)]
pub struct AggregatedTrade {
    pub key: AggregationKey,
    pub contributions: Vec<Contribution>,
    pub total_usdc_size: Decimal,
    pub average_price: Decimal,
}

impl AggregatedTrade {
    pub fn trade_count(&self) -> usize {
        self.contributions.len()
    }
}

struct Bucket {
    contributions: Vec<Contribution>,
    total_usdc_size: Decimal,
    average_price: Decimal,
    window_start: Instant,
    seq: u64,
}

impl Bucket {
    /// Recompute the running totals; the weighted average is associative
    /// and commutative up to rounding, so insertion order cannot change it.
    fn recompute(&mut self) {
        let total: Decimal = self.contributions.iter().map(|c| c.usdc_size).sum();
        let weighted: Decimal = self
            .contributions
            .iter()
            .map(|c| c.usdc_size * c.price)
            .sum();
        self.total_usdc_size = total;
        self.average_price = if total.is_zero() {
            Decimal::ZERO
        } else {
            weighted / total
        };
    }
}

#[derive(Default)]
struct AggState {
    buckets: HashMap<AggregationKey, Bucket>,
    next_seq: u64,
}

/// Time-windowed buffer merging same-key intents into one weighted-average
/// order.
///
/// Drain is pull-based: callers poll and a bucket becomes ready once its
/// window has elapsed since the first insert. All bucket mutation happens
/// inside one mutex; persistence writes for suppressed buckets run after
/// the lock is released.
pub struct TradeAggregator {
    window: Duration,
    min_order_size_usd: Decimal,
    state: Mutex<AggState>,
}

impl TradeAggregator {
    pub fn new(window: Duration, min_order_size_usd: Decimal) -> Self {
        Self {
            window,
            min_order_size_usd,
            state: Mutex::new(AggState::default()),
        }
    }

    /// Buffer a validated intent. Creates the bucket on first arrival for
    /// the key; appends and recomputes otherwise. `window_start` never moves.
    pub fn add(&self, key: AggregationKey, contribution: Contribution) {
        let mut state = self.state.lock().unwrap();
        if !state.buckets.contains_key(&key) {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.buckets.insert(
                key.clone(),
                Bucket {
                    contributions: Vec::new(),
                    total_usdc_size: Decimal::ZERO,
                    average_price: Decimal::ZERO,
                    window_start: Instant::now(),
                    seq,
                },
            );
        }
        let bucket = state.buckets.get_mut(&key).expect("bucket just inserted");
        bucket.contributions.push(contribution);
        bucket.recompute();
    }

    /// Number of live buckets.
    pub fn buffer_size(&self) -> usize {
        self.state.lock().unwrap().buckets.len()
    }

    /// Atomically remove every ready bucket. Ready buckets below the
    /// minimum order size are suppressed: their contributing activities are
    /// flagged as aggregator-processed in persistence and nothing is
    /// emitted. Emission order is bucket-creation order.
    pub async fn drain_ready(&self, store: &dyn ActivityStore) -> BotResult<Vec<AggregatedTrade>> {
        let mut ready = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let ready_keys: Vec<AggregationKey> = state
                .buckets
                .iter()
                .filter(|(_, b)| b.window_start.elapsed() >= self.window)
                .map(|(k, _)| k.clone())
                .collect();
            for key in ready_keys {
                if let Some(bucket) = state.buckets.remove(&key) {
                    ready.push((key, bucket));
                }
            }
        }
        ready.sort_by_key(|(_, b)| b.seq);

        let mut emitted = Vec::new();
        for (key, bucket) in ready {
            if bucket.total_usdc_size < self.min_order_size_usd {
                tracing::info!(
                    asset_id = %key.asset_id,
                    side = %key.side,
                    total = %bucket.total_usdc_size,
                    min = %self.min_order_size_usd,
                    trades = bucket.contributions.len(),
                    "Aggregated total below minimum, suppressing bucket"
                );
                for c in &bucket.contributions {
                    store.mark_aggregator_processed(&c.activity_id).await?;
                }
                continue;
            }
            emitted.push(AggregatedTrade {
                key,
                total_usdc_size: bucket.total_usdc_size,
                average_price: bucket.average_price,
                contributions: bucket.contributions,
            });
        }
        Ok(emitted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
