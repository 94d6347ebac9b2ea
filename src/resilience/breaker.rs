use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::errors::{BotError, BotResult};

/// Breaker tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures in the monitoring window before opening.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    pub recovery_timeout: Duration,
    /// A success this long after the last failure clears the count.
    pub monitoring_period: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Consistent point-in-time view of one breaker, for admin surfaces.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure_age: Option<Duration>,
}

/// Three-state failure isolation for one named outbound dependency.
///
/// Closed: calls run, failures count toward the threshold. Open: fail fast
/// until the recovery timeout elapses, then allow a single half-open probe.
/// A successful probe closes and resets; a failed probe re-opens. State is
/// only ever touched under the inner mutex and never across an await.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` under the breaker. An open breaker fails fast with a
    /// CIRCUIT_BREAKER error; any other failure propagates unchanged after
    /// the state update.
    pub async fn call<T, F, Fut>(&self, op: F) -> BotResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BotResult<T>>,
    {
        self.before_call()?;
        let result = op().await;
        match result {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err)
            }
        }
    }

    fn before_call(&self) -> BotResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let recovered = inner
                    .last_failure
                    .map(|t| t.elapsed() > self.config.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    inner.state = BreakerState::HalfOpen;
                    tracing::info!(breaker = %self.name, "Circuit breaker half-open, probing");
                    Ok(())
                } else {
                    Err(BotError::circuit_breaker(
                        "BREAKER_OPEN",
                        format!("circuit breaker '{}' is open", self.name),
                    ))
                }
            }
            // A probe is already in flight; fail fast rather than stampede
            BreakerState::HalfOpen => Err(BotError::circuit_breaker(
                "BREAKER_OPEN",
                format!("circuit breaker '{}' is probing", self.name),
            )),
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                tracing::info!(breaker = %self.name, "Circuit breaker closed after probe");
                inner.state = BreakerState::Closed;
                inner.failure_count = 0;
                inner.last_failure = None;
            }
            BreakerState::Closed => {
                let stale = inner
                    .last_failure
                    .map(|t| t.elapsed() > self.config.monitoring_period)
                    .unwrap_or(false);
                if stale {
                    inner.failure_count = 0;
                }
            }
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_failure = Some(Instant::now());
        match inner.state {
            BreakerState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "Probe failed, circuit breaker re-opened");
                inner.state = BreakerState::Open;
            }
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "Circuit breaker opened"
                    );
                    inner.state = BreakerState::Open;
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_age: inner.last_failure.map(|t| t.elapsed()),
        }
    }

    /// Force the breaker closed with counters cleared.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }
}

/// Name-indexed store of breakers, owned by the long-lived process state.
///
/// Construction is lazy and first-writer-wins: the config passed on the
/// first `get` for a name sticks; later calls for the same name return the
/// existing breaker and ignore their config argument. This keeps callers
/// from silently reconfiguring a shared breaker.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str, config: Option<BreakerConfig>) -> Arc<CircuitBreaker> {
        let mut map = self.breakers.lock().unwrap();
        map.entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(name, config.unwrap_or_default()))
            })
            .clone()
    }

    pub fn all_states(&self) -> Vec<BreakerSnapshot> {
        let map = self.breakers.lock().unwrap();
        map.values().map(|b| b.snapshot()).collect()
    }

    pub fn reset_all(&self) {
        let map = self.breakers.lock().unwrap();
        for breaker in map.values() {
            breaker.reset();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
