pub mod activity_repo;
pub mod memory;

pub use activity_repo::PgActivityStore;
pub use memory::MemoryActivityStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::errors::BotResult;
use crate::models::LeaderActivity;

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    // Verify connectivity
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

/// Persistence contract the core consumes.
///
/// The store keeps leader activities keyed by id with the legacy marker
/// fields `{bot_executed_time, bot}`; updates have at-least-once semantics.
/// Marker advancement is guarded by compare-and-set so at most one worker
/// moves an activity past unseen.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Insert a freshly fetched activity; false if the id is already known.
    async fn insert_new(&self, activity: &LeaderActivity) -> BotResult<bool>;

    /// Activities still carrying an unseen marker, oldest first.
    async fn unseen_activities(&self) -> BotResult<Vec<LeaderActivity>>;

    /// CAS unseen → in-flight. True when this worker won the claim.
    async fn try_claim(&self, activity_id: &str, now_ms: i64) -> BotResult<bool>;

    /// Terminal skip (sentinel -1).
    async fn mark_skipped(&self, activity_id: &str) -> BotResult<()>;

    /// Terminal completion (positive completion timestamp).
    async fn mark_completed(&self, activity_id: &str, now_ms: i64) -> BotResult<()>;

    /// Aggregator suppression below the minimum order size (`bot = true`).
    async fn mark_aggregator_processed(&self, activity_id: &str) -> BotResult<()>;

    /// True when another activity with this transaction hash was already
    /// picked up or finished.
    async fn seen_tx_hash(&self, tx_hash: &str, excluding_id: &str) -> BotResult<bool>;

    /// Follower's current USD exposure for one outcome token, never negative.
    async fn position_size_usd(&self, asset_id: &str) -> BotResult<Decimal>;

    /// Record a mirrored fill so position tracking stays current.
    async fn record_fill(
        &self,
        activity_id: &str,
        asset_id: &str,
        side: &str,
        usd_size: Decimal,
        price: Decimal,
    ) -> BotResult<()>;
}
