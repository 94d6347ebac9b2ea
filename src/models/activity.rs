use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// Per-activity processing tag used for at-most-once mirroring.
///
/// In memory this is a tagged variant; on the wire it keeps the legacy
/// sentinel encoding (`bot_executed_time`): 0 = unseen, any positive
/// millisecond timestamp = picked up or completed, -1 = skipped. Once an
/// activity leaves `Unseen` it is never re-picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingMarker {
    Unseen,
    InFlight(i64),
    Skipped,
    Completed(i64),
}

impl ProcessingMarker {
    /// Legacy sentinel value written to persistence.
    pub fn sentinel(&self) -> i64 {
        match self {
            ProcessingMarker::Unseen => 0,
            ProcessingMarker::InFlight(ts) => *ts,
            ProcessingMarker::Skipped => -1,
            ProcessingMarker::Completed(ts) => *ts,
        }
    }

    /// Decode a stored sentinel. Positive timestamps read back as in-flight;
    /// a restart reconciles them rather than re-mirroring.
    pub fn from_sentinel(v: i64) -> Self {
        match v {
            0 => ProcessingMarker::Unseen,
            -1 => ProcessingMarker::Skipped,
            ts => ProcessingMarker::InFlight(ts),
        }
    }

    pub fn is_unseen(&self) -> bool {
        matches!(self, ProcessingMarker::Unseen)
    }
}

/// A single leader fill ingested from the exchange data API.
///
/// Immutable once received; only the processing marker advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderActivity {
    /// Stable activity identifier from the exchange.
    pub id: String,
    /// Leader wallet address.
    pub leader: String,
    /// Market condition ID.
    pub condition_id: String,
    /// Outcome token (asset) ID.
    pub asset_id: String,
    pub side: Side,
    /// Size in outcome units.
    pub size: Decimal,
    /// Size in USDC (six-decimal fixed-point semantics).
    pub usdc_size: Decimal,
    /// Price in [0, 1].
    pub price: Decimal,
    /// Leader's claimed fill time.
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
    pub marker: ProcessingMarker,
    /// Auxiliary leader profile fields, carried through opaquely.
    #[serde(default)]
    pub profile: Option<serde_json::Value>,
}

impl LeaderActivity {
    /// Age of the activity relative to `now`, in whole seconds.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_round_trip() {
        assert_eq!(ProcessingMarker::Unseen.sentinel(), 0);
        assert_eq!(ProcessingMarker::Skipped.sentinel(), -1);
        assert_eq!(ProcessingMarker::InFlight(1_700_000_000_000).sentinel(), 1_700_000_000_000);
        assert_eq!(ProcessingMarker::Completed(42).sentinel(), 42);

        assert_eq!(ProcessingMarker::from_sentinel(0), ProcessingMarker::Unseen);
        assert_eq!(ProcessingMarker::from_sentinel(-1), ProcessingMarker::Skipped);
        assert_eq!(
            ProcessingMarker::from_sentinel(99),
            ProcessingMarker::InFlight(99)
        );
    }

    #[test]
    fn test_only_unseen_is_pickable() {
        assert!(ProcessingMarker::Unseen.is_unseen());
        assert!(!ProcessingMarker::InFlight(1).is_unseen());
        assert!(!ProcessingMarker::Skipped.is_unseen());
        assert!(!ProcessingMarker::Completed(1).is_unseen());
    }
}
