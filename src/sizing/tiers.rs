use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{BotError, BotResult};

/// One band of a piecewise-constant scaling function over trader order size.
///
/// `max = None` means unbounded; an unbounded tier must be the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierMultiplier {
    pub min: Decimal,
    pub max: Option<Decimal>,
    pub multiplier: Decimal,
}

impl TierMultiplier {
    /// `[min, max)` containment; an unbounded tier matches everything >= min.
    pub fn contains(&self, size: Decimal) -> bool {
        match self.max {
            Some(max) => size >= self.min && size < max,
            None => size >= self.min,
        }
    }
}

/// Parse a `min-max:mult` / `min+:mult` comma-separated spec string,
/// e.g. `1-10:2.0,10-100:1.0,100+:0.5`.
///
/// Tiers are sorted by `min` ascending. Rejected: negative or non-numeric
/// multipliers, overlapping tiers, an unbounded tier that is not last.
pub fn parse_tiered_multipliers(spec: &str) -> BotResult<Vec<TierMultiplier>> {
    let mut tiers = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (range, mult) = part.split_once(':').ok_or_else(|| {
            BotError::validation("TIER_PARSE", format!("missing ':' in tier '{part}'"))
        })?;

        let multiplier: Decimal = mult.trim().parse().map_err(|_| {
            BotError::validation("TIER_PARSE", format!("non-numeric multiplier in '{part}'"))
        })?;
        if multiplier < Decimal::ZERO {
            return Err(BotError::validation(
                "TIER_PARSE",
                format!("negative multiplier in '{part}'"),
            ));
        }

        let range = range.trim();
        let (min, max) = if let Some(lo) = range.strip_suffix('+') {
            let min: Decimal = lo.parse().map_err(|_| {
                BotError::validation("TIER_PARSE", format!("non-numeric bound in '{part}'"))
            })?;
            (min, None)
        } else {
            let (lo, hi) = range.split_once('-').ok_or_else(|| {
                BotError::validation("TIER_PARSE", format!("malformed range in '{part}'"))
            })?;
            let min: Decimal = lo.trim().parse().map_err(|_| {
                BotError::validation("TIER_PARSE", format!("non-numeric bound in '{part}'"))
            })?;
            let max: Decimal = hi.trim().parse().map_err(|_| {
                BotError::validation("TIER_PARSE", format!("non-numeric bound in '{part}'"))
            })?;
            if max <= min {
                return Err(BotError::validation(
                    "TIER_PARSE",
                    format!("empty range in '{part}'"),
                ));
            }
            (min, Some(max))
        };

        tiers.push(TierMultiplier {
            min,
            max,
            multiplier,
        });
    }

    if tiers.is_empty() {
        return Err(BotError::validation("TIER_PARSE", "no tiers in spec string"));
    }

    tiers.sort_by(|a, b| a.min.cmp(&b.min));
    validate_tiers(&tiers)?;
    Ok(tiers)
}

/// Structural checks on a sorted tier list: no overlap, unbounded tier last.
pub fn validate_tiers(tiers: &[TierMultiplier]) -> BotResult<()> {
    for (i, tier) in tiers.iter().enumerate() {
        if tier.multiplier < Decimal::ZERO {
            return Err(BotError::validation(
                "TIER_INVALID",
                format!("tier {} has negative multiplier", i),
            ));
        }
        let last = i == tiers.len() - 1;
        match tier.max {
            None if !last => {
                return Err(BotError::validation(
                    "TIER_INVALID",
                    "unbounded tier must be last",
                ));
            }
            Some(max) if !last && max > tiers[i + 1].min => {
                return Err(BotError::validation(
                    "TIER_INVALID",
                    format!("tier {} overlaps the next tier", i),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Inverse of `parse_tiered_multipliers` for valid tier lists.
pub fn serialize_tiered_multipliers(tiers: &[TierMultiplier]) -> String {
    tiers
        .iter()
        .map(|t| match t.max {
            Some(max) => format!("{}-{}:{}", t.min, max, t.multiplier),
            None => format!("{}+:{}", t.min, t.multiplier),
        })
        .collect::<Vec<_>>()
        .join(",")
}
