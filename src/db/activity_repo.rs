use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use crate::db::ActivityStore;
use crate::errors::{BotError, BotResult};
use crate::models::{LeaderActivity, ProcessingMarker, Side};

/// Row shape of the leader_activities table.
#[derive(Debug, Clone, FromRow)]
struct ActivityRow {
    id: String,
    leader: String,
    condition_id: String,
    asset_id: String,
    side: String,
    size: Decimal,
    usdc_size: Decimal,
    price: Decimal,
    traded_at: DateTime<Utc>,
    tx_hash: String,
    bot_executed_time: i64,
    profile: Option<serde_json::Value>,
}

impl ActivityRow {
    fn into_activity(self) -> BotResult<LeaderActivity> {
        let side = Side::from_api_str(&self.side).ok_or_else(|| {
            BotError::database("DB_ROW", format!("unknown side '{}' in row {}", self.side, self.id))
        })?;
        Ok(LeaderActivity {
            id: self.id,
            leader: self.leader,
            condition_id: self.condition_id,
            asset_id: self.asset_id,
            side,
            size: self.size,
            usdc_size: self.usdc_size,
            price: self.price,
            timestamp: self.traded_at,
            tx_hash: self.tx_hash,
            marker: ProcessingMarker::from_sentinel(self.bot_executed_time),
            profile: self.profile,
        })
    }
}

/// Postgres-backed activity store.
#[derive(Clone)]
pub struct PgActivityStore {
    pool: PgPool,
}

impl PgActivityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> BotError {
    BotError::database("DB_QUERY", e.to_string())
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn insert_new(&self, activity: &LeaderActivity) -> BotResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO leader_activities
                (id, leader, condition_id, asset_id, side, size, usdc_size, price,
                 traded_at, tx_hash, bot_executed_time, bot, profile)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, FALSE, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&activity.id)
        .bind(&activity.leader)
        .bind(&activity.condition_id)
        .bind(&activity.asset_id)
        .bind(activity.side.as_str())
        .bind(activity.size)
        .bind(activity.usdc_size)
        .bind(activity.price)
        .bind(activity.timestamp)
        .bind(&activity.tx_hash)
        .bind(&activity.profile)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn unseen_activities(&self) -> BotResult<Vec<LeaderActivity>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, leader, condition_id, asset_id, side, size, usdc_size, price,
                   traded_at, tx_hash, bot_executed_time, profile
            FROM leader_activities
            WHERE bot_executed_time = 0
            ORDER BY traded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(ActivityRow::into_activity).collect()
    }

    async fn try_claim(&self, activity_id: &str, now_ms: i64) -> BotResult<bool> {
        let result = sqlx::query(
            "UPDATE leader_activities SET bot_executed_time = $2 \
             WHERE id = $1 AND bot_executed_time = 0",
        )
        .bind(activity_id)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_skipped(&self, activity_id: &str) -> BotResult<()> {
        sqlx::query("UPDATE leader_activities SET bot_executed_time = -1 WHERE id = $1")
            .bind(activity_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn mark_completed(&self, activity_id: &str, now_ms: i64) -> BotResult<()> {
        sqlx::query("UPDATE leader_activities SET bot_executed_time = $2 WHERE id = $1")
            .bind(activity_id)
            .bind(now_ms)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn mark_aggregator_processed(&self, activity_id: &str) -> BotResult<()> {
        sqlx::query("UPDATE leader_activities SET bot = TRUE, bot_executed_time = -1 WHERE id = $1")
            .bind(activity_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn seen_tx_hash(&self, tx_hash: &str, excluding_id: &str) -> BotResult<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM leader_activities \
             WHERE tx_hash = $1 AND id <> $2 AND bot_executed_time <> 0",
        )
        .bind(tx_hash)
        .bind(excluding_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.0 > 0)
    }

    async fn position_size_usd(&self, asset_id: &str) -> BotResult<Decimal> {
        let row: (Option<Decimal>,) = sqlx::query_as(
            r#"
            SELECT SUM(CASE WHEN side = 'BUY' THEN usd_size ELSE -usd_size END)
            FROM mirrored_fills
            WHERE asset_id = $1
            "#,
        )
        .bind(asset_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.0.unwrap_or(Decimal::ZERO).max(Decimal::ZERO))
    }

    async fn record_fill(
        &self,
        activity_id: &str,
        asset_id: &str,
        side: &str,
        usd_size: Decimal,
        price: Decimal,
    ) -> BotResult<()> {
        sqlx::query(
            "INSERT INTO mirrored_fills (activity_id, asset_id, side, usd_size, price) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(activity_id)
        .bind(asset_id)
        .bind(side)
        .bind(usd_size)
        .bind(price)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
