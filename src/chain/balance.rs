use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;

use crate::errors::{BotError, BotResult, ErrorKind};
use crate::resilience::{BreakerConfig, BreakerRegistry, CircuitBreaker};

/// Source of the follower's spendable balance. The on-chain probe is the
/// production implementation; tests substitute a fake.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn get_balance(&self, address: &str) -> BotResult<Decimal>;
}

/// ERC-20 `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";
/// USDC uses six decimals on Polygon.
const USDC_DECIMALS: u32 = 6;

/// Reads the follower's USDC balance straight from chain via `eth_call`.
///
/// All RPC traffic runs under the shared "polygon-balance" breaker so a
/// flapping node cannot stall the pipeline; failures surface as API errors
/// with the queried address redacted.
pub struct BalanceProbe {
    http: Client,
    rpc_url: String,
    usdc_contract: String,
    breaker: Arc<CircuitBreaker>,
}

impl BalanceProbe {
    pub fn new(
        registry: &BreakerRegistry,
        rpc_url: impl Into<String>,
        usdc_contract: impl Into<String>,
    ) -> Self {
        let breaker = registry.get(
            "polygon-balance",
            Some(BreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(30),
                ..Default::default()
            }),
        );
        Self {
            http: Client::new(),
            rpc_url: rpc_url.into(),
            usdc_contract: usdc_contract.into(),
            breaker,
        }
    }

    /// Follower's USDC balance as a decimal number of dollars.
    async fn fetch_balance(&self, address: &str) -> BotResult<Decimal> {
        let result = self.breaker.call(|| self.balance_of(address)).await;

        result.map_err(|e| {
            if e.kind == ErrorKind::CircuitBreaker {
                return e;
            }
            BotError::api(
                "BALANCE_PROBE",
                format!("balanceOf({}) failed: {}", redact_address(address), e.message),
            )
        })
    }

    async fn balance_of(&self, address: &str) -> BotResult<Decimal> {
        let data = encode_balance_of(address)?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{"to": self.usdc_contract, "data": data}, "latest"],
        });

        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BotError::network("RPC_TRANSPORT", e.to_string()))?
            .error_for_status()
            .map_err(|e| BotError::api("RPC_STATUS", e.to_string()))?;

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BotError::api("RPC_BODY", e.to_string()))?;

        parse_balance_result(&payload)
    }
}

#[async_trait]
impl BalanceSource for BalanceProbe {
    async fn get_balance(&self, address: &str) -> BotResult<Decimal> {
        self.fetch_balance(address).await
    }
}

/// Constant balance for dry-run mode, standing in for the chain probe the
/// way a configured bankroll would.
pub struct FixedBalance(pub Decimal);

#[async_trait]
impl BalanceSource for FixedBalance {
    async fn get_balance(&self, _address: &str) -> BotResult<Decimal> {
        Ok(self.0)
    }
}

/// ABI-encode `balanceOf(address)` calldata.
fn encode_balance_of(address: &str) -> BotResult<String> {
    let hex = address.strip_prefix("0x").unwrap_or(address);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BotError::validation(
            "BAD_ADDRESS",
            format!("not an EVM address: {}", redact_address(address)),
        ));
    }
    Ok(format!("0x{BALANCE_OF_SELECTOR}{:0>64}", hex.to_lowercase()))
}

/// Decode the `eth_call` result into dollars.
fn parse_balance_result(payload: &serde_json::Value) -> BotResult<Decimal> {
    if let Some(err) = payload.get("error") {
        return Err(BotError::api("RPC_ERROR", err.to_string()));
    }

    let hex = payload
        .get("result")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BotError::api("RPC_RESULT", "missing result field"))?;

    let raw = U256::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| BotError::api("RPC_RESULT", format!("bad balance hex: {e}")))?;
    let units = i128::try_from(raw)
        .map_err(|_| BotError::api("RPC_RESULT", "balance out of range"))?;

    Decimal::try_from_i128_with_scale(units, USDC_DECIMALS)
        .map_err(|e| BotError::api("RPC_RESULT", format!("balance out of range: {e}")))
}

/// First-6/last-4 redaction for log and error output.
fn redact_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
