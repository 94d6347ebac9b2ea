pub mod aggregator;
pub mod engine;
pub mod validator;

pub use aggregator::{AggregatedTrade, AggregationKey, Contribution, TradeAggregator};
pub use engine::ExecutionEngine;
pub use validator::{TradeValidator, ValidationOutcome};
