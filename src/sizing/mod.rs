pub mod tiers;

pub use tiers::{
    parse_tiered_multipliers, serialize_tiered_multipliers, validate_tiers, TierMultiplier,
};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Copy-sizing strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyStrategy {
    Percentage,
    Fixed,
    Adaptive,
}

impl CopyStrategy {
    pub fn parse_strategy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fixed" => CopyStrategy::Fixed,
            "adaptive" => CopyStrategy::Adaptive,
            _ => CopyStrategy::Percentage,
        }
    }
}

impl fmt::Display for CopyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyStrategy::Percentage => write!(f, "percentage"),
            CopyStrategy::Fixed => write!(f, "fixed"),
            CopyStrategy::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Copy-strategy configuration.
///
/// `copy_size` is a percent for PERCENTAGE/ADAPTIVE and an absolute USDC
/// amount for FIXED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyStrategyConfig {
    pub strategy: CopyStrategy,
    pub copy_size: Decimal,
    pub max_order_size_usd: Decimal,
    pub min_order_size_usd: Decimal,
    pub max_position_size_usd: Option<Decimal>,
    pub adaptive_min_percent: Option<Decimal>,
    pub adaptive_max_percent: Option<Decimal>,
    pub adaptive_threshold: Option<Decimal>,
    pub trade_multiplier: Option<Decimal>,
    pub tiered_multipliers: Option<Vec<TierMultiplier>>,
}

impl Default for CopyStrategyConfig {
    fn default() -> Self {
        Self {
            strategy: CopyStrategy::Percentage,
            copy_size: dec!(10),
            max_order_size_usd: dec!(100),
            min_order_size_usd: dec!(1),
            max_position_size_usd: None,
            adaptive_min_percent: None,
            adaptive_max_percent: None,
            adaptive_threshold: None,
            trade_multiplier: None,
            tiered_multipliers: None,
        }
    }
}

/// Sizing decision for one leader fill.
///
/// `final_amount` is zero exactly when `below_minimum` is set (or the
/// validator later skips the trade). `reasoning` is a human-readable trace
/// of each step that fired.
#[derive(Debug, Clone)]
pub struct SizedOrder {
    pub strategy: CopyStrategy,
    pub trader_order_size: Decimal,
    pub base_amount: Decimal,
    pub final_amount: Decimal,
    pub capped_by_max: bool,
    pub reduced_by_balance: bool,
    pub below_minimum: bool,
    pub reasoning: Vec<String>,
}

/// Balance haircut applied when an order is clipped to the available
/// balance; the slack covers gas and rounding.
const BALANCE_HAIRCUT: Decimal = dec!(0.99);

/// Map a leader fill to a sized order. Pure: no I/O, no clock, no state.
pub fn calculate_order_size(
    config: &CopyStrategyConfig,
    trader_order_size: Decimal,
    available_balance: Decimal,
    current_position_size: Decimal,
) -> SizedOrder {
    let mut reasoning = Vec::new();

    // 1. Base amount by strategy
    let mut base_amount = match config.strategy {
        CopyStrategy::Fixed => {
            reasoning.push(format!("Fixed copy size ${}", config.copy_size));
            config.copy_size
        }
        CopyStrategy::Percentage => {
            let base = trader_order_size * config.copy_size / dec!(100);
            reasoning.push(format!(
                "{}% of trader's ${} = ${}",
                config.copy_size, trader_order_size, base
            ));
            base
        }
        CopyStrategy::Adaptive => {
            let pct = adaptive_percent(config, trader_order_size);
            let base = trader_order_size * pct / dec!(100);
            reasoning.push(format!(
                "Adaptive {}% of trader's ${} = ${}",
                pct, trader_order_size, base
            ));
            base
        }
    };

    // 2. Trade multiplier (tiered table wins over the flat multiplier)
    let multiplier = get_trade_multiplier(config, trader_order_size);
    if multiplier != Decimal::ONE {
        base_amount *= multiplier;
        reasoning.push(format!("Applied {multiplier}x multiplier = ${base_amount}"));
    }

    // 3. Cap by max order size
    let mut capped_by_max = false;
    let mut final_amount = base_amount;
    if final_amount > config.max_order_size_usd {
        final_amount = config.max_order_size_usd;
        capped_by_max = true;
        reasoning.push(format!("Capped at max order size ${final_amount}"));
    }

    // 4. Position cap
    if let Some(cap) = config.max_position_size_usd {
        let position = current_position_size.max(Decimal::ZERO);
        if position + final_amount > cap {
            final_amount = (cap - position).max(Decimal::ZERO);
            reasoning.push(format!(
                "Reduced to fit position limit (${position} held, cap ${cap})"
            ));
        }
    }

    // 5. Balance reduction
    let mut reduced_by_balance = false;
    if final_amount > available_balance {
        final_amount = available_balance * BALANCE_HAIRCUT;
        reduced_by_balance = true;
        reasoning.push(format!(
            "Reduced to 99% of available balance = ${final_amount}"
        ));
    }

    // 6. Minimum suppression
    let mut below_minimum = false;
    if final_amount < config.min_order_size_usd {
        reasoning.push(format!(
            "${final_amount} below minimum ${}, suppressed",
            config.min_order_size_usd
        ));
        final_amount = Decimal::ZERO;
        below_minimum = true;
    }

    SizedOrder {
        strategy: config.strategy,
        trader_order_size,
        base_amount,
        final_amount,
        capped_by_max,
        reduced_by_balance,
        below_minimum,
        reasoning,
    }
}

/// Adaptive percent curve: large leader fills are copied at a smaller
/// percentage. Non-increasing in `trader_order_size`.
fn adaptive_percent(config: &CopyStrategyConfig, trader_order_size: Decimal) -> Decimal {
    let min = config.adaptive_min_percent.unwrap_or(config.copy_size);
    let max = config.adaptive_max_percent.unwrap_or(config.copy_size);
    let threshold = match config.adaptive_threshold {
        Some(t) if t > Decimal::ZERO => t,
        _ => return config.copy_size,
    };

    if trader_order_size <= threshold {
        let pct = max - (trader_order_size / threshold) * (max - min);
        pct.min(max).max(min)
    } else {
        // Past the threshold, shrink the lower bound proportionally.
        min * threshold / trader_order_size
    }
}

/// Multiplier for a given trader order size: the matching tier if a tiered
/// table is configured, else the flat multiplier, else 1.
pub fn get_trade_multiplier(config: &CopyStrategyConfig, trader_order_size: Decimal) -> Decimal {
    if let Some(tiers) = config.tiered_multipliers.as_deref() {
        if !tiers.is_empty() {
            return tiers
                .iter()
                .find(|t| t.contains(trader_order_size))
                .map(|t| t.multiplier)
                .unwrap_or(Decimal::ONE);
        }
    }
    config.trade_multiplier.unwrap_or(Decimal::ONE)
}

/// Validate a copy-strategy configuration; returns one message per problem.
pub fn validate_copy_strategy_config(config: &CopyStrategyConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.copy_size <= Decimal::ZERO {
        errors.push("copy_size must be positive".to_string());
    }
    if config.strategy == CopyStrategy::Percentage && config.copy_size > dec!(100) {
        errors.push("percentage copy_size cannot exceed 100".to_string());
    }
    if config.max_order_size_usd <= Decimal::ZERO {
        errors.push("max_order_size_usd must be positive".to_string());
    }
    if config.min_order_size_usd < Decimal::ZERO {
        errors.push("min_order_size_usd cannot be negative".to_string());
    }
    if config.min_order_size_usd > config.max_order_size_usd {
        errors.push("min_order_size_usd cannot exceed max_order_size_usd".to_string());
    }
    if config.strategy == CopyStrategy::Adaptive {
        match (config.adaptive_min_percent, config.adaptive_max_percent) {
            (Some(min), Some(max)) => {
                if min > max {
                    errors.push(
                        "adaptive_min_percent cannot exceed adaptive_max_percent".to_string(),
                    );
                }
            }
            _ => errors.push("adaptive strategy requires both adaptive bounds".to_string()),
        }
        match config.adaptive_threshold {
            Some(t) if t > Decimal::ZERO => {}
            _ => errors.push("adaptive strategy requires a positive adaptive_threshold".to_string()),
        }
    }
    if let Some(tiers) = config.tiered_multipliers.as_deref() {
        if let Err(e) = validate_tiers(tiers) {
            errors.push(e.message);
        }
    }

    errors
}

/// Suggest a starting configuration from the follower's balance.
pub fn get_recommended_config(balance: Decimal) -> CopyStrategyConfig {
    if balance < dec!(500) {
        // Conservative: small percentage, tight cap
        CopyStrategyConfig {
            strategy: CopyStrategy::Percentage,
            copy_size: dec!(5),
            max_order_size_usd: dec!(20),
            min_order_size_usd: dec!(1),
            ..Default::default()
        }
    } else if balance < dec!(2000) {
        CopyStrategyConfig {
            strategy: CopyStrategy::Percentage,
            copy_size: dec!(10),
            max_order_size_usd: dec!(50),
            min_order_size_usd: dec!(1),
            ..Default::default()
        }
    } else {
        CopyStrategyConfig {
            strategy: CopyStrategy::Adaptive,
            copy_size: dec!(10),
            max_order_size_usd: balance / dec!(20),
            min_order_size_usd: dec!(1),
            adaptive_min_percent: Some(dec!(5)),
            adaptive_max_percent: Some(dec!(15)),
            adaptive_threshold: Some(dec!(1000)),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn percentage_config(copy: Decimal, max: Decimal, min: Decimal) -> CopyStrategyConfig {
        CopyStrategyConfig {
            strategy: CopyStrategy::Percentage,
            copy_size: copy,
            max_order_size_usd: max,
            min_order_size_usd: min,
            ..Default::default()
        }
    }

    #[test]
    fn test_percentage_plain() {
        let cfg = percentage_config(dec!(10), dec!(100), dec!(1));
        let s = calculate_order_size(&cfg, dec!(100), dec!(50), Decimal::ZERO);
        assert_eq!(s.base_amount, dec!(10));
        assert_eq!(s.final_amount, dec!(10));
        assert!(!s.capped_by_max);
        assert!(!s.reduced_by_balance);
        assert!(!s.below_minimum);
    }

    #[test]
    fn test_capped_by_max() {
        let cfg = percentage_config(dec!(10), dec!(5), dec!(1));
        let s = calculate_order_size(&cfg, dec!(100), dec!(50), Decimal::ZERO);
        assert_eq!(s.final_amount, dec!(5));
        assert!(s.capped_by_max);
    }

    #[test]
    fn test_reduced_by_balance() {
        let cfg = percentage_config(dec!(10), dec!(100), dec!(1));
        let s = calculate_order_size(&cfg, dec!(100), dec!(5), Decimal::ZERO);
        assert_eq!(s.final_amount, dec!(4.95));
        assert!(s.reduced_by_balance);
        assert!(!s.below_minimum);
    }

    #[test]
    fn test_below_minimum_suppressed() {
        let cfg = percentage_config(dec!(10), dec!(100), dec!(20));
        let s = calculate_order_size(&cfg, dec!(100), dec!(50), Decimal::ZERO);
        assert_eq!(s.final_amount, Decimal::ZERO);
        assert!(s.below_minimum);
    }

    #[test]
    fn test_fixed_with_tiered_multipliers() {
        let cfg = CopyStrategyConfig {
            strategy: CopyStrategy::Fixed,
            copy_size: dec!(10),
            max_order_size_usd: dec!(100),
            min_order_size_usd: dec!(1),
            tiered_multipliers: Some(
                parse_tiered_multipliers("0-50:2.0,50-200:1.0,200+:0.5").unwrap(),
            ),
            ..Default::default()
        };
        let s = calculate_order_size(&cfg, dec!(25), dec!(1000), Decimal::ZERO);
        assert_eq!(s.final_amount, dec!(20.0));
        let s = calculate_order_size(&cfg, dec!(100), dec!(1000), Decimal::ZERO);
        assert_eq!(s.final_amount, dec!(10.0));
        let s = calculate_order_size(&cfg, dec!(300), dec!(1000), Decimal::ZERO);
        assert_eq!(s.final_amount, dec!(5.0));
    }

    #[test]
    fn test_percentage_with_tiered_multipliers() {
        let cfg = CopyStrategyConfig {
            tiered_multipliers: Some(
                parse_tiered_multipliers("0-50:2.0,50-200:1.0,200+:0.5").unwrap(),
            ),
            ..percentage_config(dec!(10), dec!(100), dec!(1))
        };
        // 10% of 25 doubled, 10% of 100 unchanged, 10% of 300 halved
        assert_eq!(
            calculate_order_size(&cfg, dec!(25), dec!(1000), Decimal::ZERO).final_amount,
            dec!(5.0)
        );
        assert_eq!(
            calculate_order_size(&cfg, dec!(100), dec!(1000), Decimal::ZERO).final_amount,
            dec!(10.0)
        );
        assert_eq!(
            calculate_order_size(&cfg, dec!(300), dec!(1000), Decimal::ZERO).final_amount,
            dec!(15.0)
        );
    }

    #[test]
    fn test_flat_multiplier_when_no_tiers() {
        let cfg = CopyStrategyConfig {
            trade_multiplier: Some(dec!(0.5)),
            ..percentage_config(dec!(10), dec!(100), dec!(1))
        };
        let s = calculate_order_size(&cfg, dec!(100), dec!(1000), Decimal::ZERO);
        assert_eq!(s.final_amount, dec!(5.0));
    }

    #[test]
    fn test_position_cap() {
        let cfg = CopyStrategyConfig {
            max_position_size_usd: Some(dec!(30)),
            ..percentage_config(dec!(10), dec!(100), dec!(1))
        };
        // Holding 25 of a 30 cap leaves room for 5
        let s = calculate_order_size(&cfg, dec!(100), dec!(1000), dec!(25));
        assert_eq!(s.final_amount, dec!(5));
        assert!(s.reasoning.iter().any(|r| r.contains("position limit")));

        // Cap already full: suppressed entirely
        let s = calculate_order_size(&cfg, dec!(100), dec!(1000), dec!(30));
        assert_eq!(s.final_amount, Decimal::ZERO);
        assert!(s.below_minimum);
    }

    #[test]
    fn test_negative_position_treated_as_flat() {
        let cfg = CopyStrategyConfig {
            max_position_size_usd: Some(dec!(30)),
            ..percentage_config(dec!(10), dec!(100), dec!(1))
        };
        let s = calculate_order_size(&cfg, dec!(100), dec!(1000), dec!(-50));
        assert_eq!(s.final_amount, dec!(10));
    }

    #[test]
    fn test_zero_inputs() {
        let cfg = percentage_config(dec!(10), dec!(100), dec!(1));
        let s = calculate_order_size(&cfg, Decimal::ZERO, dec!(50), Decimal::ZERO);
        assert_eq!(s.final_amount, Decimal::ZERO);
        assert!(s.below_minimum);

        let s = calculate_order_size(&cfg, dec!(100), Decimal::ZERO, Decimal::ZERO);
        assert_eq!(s.final_amount, Decimal::ZERO);
        assert!(s.below_minimum);
    }

    #[test]
    fn test_min_equals_max_only_exact_amount_survives() {
        let cfg = percentage_config(dec!(10), dec!(10), dec!(10));
        // 10% of 100 = 10 = min = max: passes at exactly that amount
        let s = calculate_order_size(&cfg, dec!(100), dec!(1000), Decimal::ZERO);
        assert_eq!(s.final_amount, dec!(10));
        // 10% of 50 = 5 < min: suppressed
        let s = calculate_order_size(&cfg, dec!(50), dec!(1000), Decimal::ZERO);
        assert_eq!(s.final_amount, Decimal::ZERO);
        // 10% of 200 = 20 > max: capped to 10 which meets min
        let s = calculate_order_size(&cfg, dec!(200), dec!(1000), Decimal::ZERO);
        assert_eq!(s.final_amount, dec!(10));
        assert!(s.capped_by_max);
    }

    #[test]
    fn test_adaptive_bounds_and_monotonicity() {
        let cfg = CopyStrategyConfig {
            strategy: CopyStrategy::Adaptive,
            copy_size: dec!(10),
            max_order_size_usd: dec!(10_000),
            min_order_size_usd: Decimal::ZERO,
            adaptive_min_percent: Some(dec!(5)),
            adaptive_max_percent: Some(dec!(15)),
            adaptive_threshold: Some(dec!(1000)),
            ..Default::default()
        };

        // Tiny order copies at the top percent
        let small = calculate_order_size(&cfg, dec!(1), dec!(1_000_000), Decimal::ZERO);
        assert_eq!(small.base_amount, dec!(1) * dec!(14.99) / dec!(100));

        // At the threshold the percent bottoms out at the lower bound
        let at = calculate_order_size(&cfg, dec!(1000), dec!(1_000_000), Decimal::ZERO);
        assert_eq!(at.base_amount, dec!(1000) * dec!(5) / dec!(100));

        // Percent is non-increasing in trader size
        let sizes = [
            dec!(1),
            dec!(10),
            dec!(100),
            dec!(500),
            dec!(1000),
            dec!(2000),
            dec!(10_000),
        ];
        let mut last_pct = dec!(1000);
        for size in sizes {
            let s = calculate_order_size(&cfg, size, dec!(1_000_000), Decimal::ZERO);
            let pct = s.base_amount / size * dec!(100);
            assert!(pct <= last_pct, "percent increased at size {size}");
            last_pct = pct;
        }
    }

    #[test]
    fn test_determinism() {
        let cfg = percentage_config(dec!(7), dec!(40), dec!(2));
        let a = calculate_order_size(&cfg, dec!(333), dec!(91), dec!(12));
        let b = calculate_order_size(&cfg, dec!(333), dec!(91), dec!(12));
        assert_eq!(a.final_amount, b.final_amount);
        assert_eq!(a.reasoning, b.reasoning);
    }

    #[test]
    fn test_validate_config() {
        let mut cfg = percentage_config(dec!(10), dec!(100), dec!(1));
        assert!(validate_copy_strategy_config(&cfg).is_empty());

        cfg.copy_size = Decimal::ZERO;
        assert!(!validate_copy_strategy_config(&cfg).is_empty());

        cfg.copy_size = dec!(150);
        assert!(validate_copy_strategy_config(&cfg)
            .iter()
            .any(|e| e.contains("100")));

        let cfg = percentage_config(dec!(10), dec!(5), dec!(10));
        assert!(validate_copy_strategy_config(&cfg)
            .iter()
            .any(|e| e.contains("min_order_size_usd")));

        let cfg = CopyStrategyConfig {
            strategy: CopyStrategy::Adaptive,
            ..percentage_config(dec!(10), dec!(100), dec!(1))
        };
        let errors = validate_copy_strategy_config(&cfg);
        assert!(errors.iter().any(|e| e.contains("adaptive bounds")));
        assert!(errors.iter().any(|e| e.contains("adaptive_threshold")));
    }

    #[test]
    fn test_recommended_config_tiers() {
        let small = get_recommended_config(dec!(100));
        assert_eq!(small.strategy, CopyStrategy::Percentage);
        assert_eq!(small.copy_size, dec!(5));
        assert_eq!(small.max_order_size_usd, dec!(20));

        let mid = get_recommended_config(dec!(1000));
        assert_eq!(mid.strategy, CopyStrategy::Percentage);
        assert_eq!(mid.copy_size, dec!(10));
        assert_eq!(mid.max_order_size_usd, dec!(50));

        let large = get_recommended_config(dec!(4000));
        assert_eq!(large.strategy, CopyStrategy::Adaptive);
        assert_eq!(large.max_order_size_usd, dec!(200));
        assert!(validate_copy_strategy_config(&large).is_empty());
    }

    #[test]
    fn test_final_amount_never_negative() {
        let cfg = CopyStrategyConfig {
            max_position_size_usd: Some(dec!(10)),
            ..percentage_config(dec!(10), dec!(100), Decimal::ZERO)
        };
        let s = calculate_order_size(&cfg, dec!(100), dec!(1000), dec!(50));
        assert_eq!(s.final_amount, Decimal::ZERO);
    }
}
