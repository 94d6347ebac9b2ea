pub mod breaker;

pub use breaker::{BreakerConfig, BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker};
