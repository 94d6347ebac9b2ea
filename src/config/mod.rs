use std::env;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::errors::{BotError, BotResult};
use crate::net::FetcherConfig;
use crate::sizing::{
    parse_tiered_multipliers, validate_copy_strategy_config, CopyStrategy, CopyStrategyConfig,
};

const DEFAULT_DATA_API_URL: &str = "https://data-api.polymarket.com";
const DEFAULT_CLOB_API_URL: &str = "https://clob.polymarket.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string; absent in dry-run means in-memory store.
    pub database_url: Option<String>,
    pub rpc_url: String,
    pub usdc_contract_address: String,
    pub follower_address: String,
    pub leader_addresses: Vec<String>,

    pub data_api_url: String,
    pub clob_api_url: String,

    pub network_retry_limit: u32,
    pub request_timeout_ms: u64,
    pub trade_aggregation_window_seconds: u64,
    pub poll_interval_secs: u64,
    pub max_activity_age_secs: u64,
    pub fetch_limit: u32,

    pub dry_run: bool,
    /// Dry-run balance stand-in when the chain probe is not used.
    pub bankroll: Decimal,

    pub copy: CopyStrategyConfig,
}

fn required(key: &str) -> BotResult<String> {
    env::var(key).map_err(|_| BotError::configuration("ENV_MISSING", format!("{key} must be set")))
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> BotResult<T> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            BotError::configuration("ENV_INVALID", format!("{key} has an invalid value: {raw}"))
        }),
    }
}

fn parse_opt(key: &str) -> BotResult<Option<Decimal>> {
    match env::var(key) {
        Err(_) => Ok(None),
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw.parse::<Decimal>().map(Some).map_err(|_| {
            BotError::configuration("ENV_INVALID", format!("{key} has an invalid value: {raw}"))
        }),
    }
}

impl AppConfig {
    pub fn from_env() -> BotResult<Self> {
        let dry_run = parse_var("DRY_RUN", true)?;

        let database_url = env::var("DATABASE_URL").ok();
        if database_url.is_none() && !dry_run {
            return Err(BotError::configuration(
                "ENV_MISSING",
                "DATABASE_URL must be set when DRY_RUN=false",
            ));
        }

        let leader_addresses: Vec<String> = required("LEADER_ADDRESSES")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if leader_addresses.is_empty() {
            return Err(BotError::configuration(
                "ENV_INVALID",
                "LEADER_ADDRESSES must list at least one leader",
            ));
        }

        let network_retry_limit: u32 = parse_var("NETWORK_RETRY_LIMIT", 3)?;
        if network_retry_limit < 1 {
            return Err(BotError::configuration(
                "ENV_INVALID",
                "NETWORK_RETRY_LIMIT must be at least 1",
            ));
        }

        let copy = copy_config_from_env()?;
        let problems = validate_copy_strategy_config(&copy);
        if !problems.is_empty() {
            return Err(BotError::configuration(
                "COPY_CONFIG",
                format!("invalid copy strategy config: {}", problems.join("; ")),
            ));
        }

        Ok(Self {
            database_url,
            rpc_url: required("RPC_URL")?,
            usdc_contract_address: required("USDC_CONTRACT_ADDRESS")?,
            follower_address: required("FOLLOWER_ADDRESS")?,
            leader_addresses,
            data_api_url: env::var("DATA_API_URL").unwrap_or_else(|_| DEFAULT_DATA_API_URL.into()),
            clob_api_url: env::var("CLOB_API_URL").unwrap_or_else(|_| DEFAULT_CLOB_API_URL.into()),
            network_retry_limit,
            request_timeout_ms: parse_var("REQUEST_TIMEOUT_MS", 10_000)?,
            trade_aggregation_window_seconds: parse_var("TRADE_AGGREGATION_WINDOW_SECONDS", 60)?,
            poll_interval_secs: parse_var("POLL_INTERVAL_SECS", 15)?,
            max_activity_age_secs: parse_var("MAX_ACTIVITY_AGE_SECS", 300)?,
            fetch_limit: parse_var("FETCH_LIMIT", 50)?,
            dry_run,
            bankroll: parse_var("BANKROLL", Decimal::from(1_000))?,
            copy,
        })
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            max_attempts: self.network_retry_limit,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            ..Default::default()
        }
    }

    /// A zero window disables aggregation entirely.
    pub fn aggregation_enabled(&self) -> bool {
        self.trade_aggregation_window_seconds > 0
    }
}

fn copy_config_from_env() -> BotResult<CopyStrategyConfig> {
    let strategy = CopyStrategy::parse_strategy(
        &env::var("COPY_STRATEGY").unwrap_or_else(|_| "percentage".into()),
    );

    let defaults = CopyStrategyConfig::default();
    let tiered_multipliers = match env::var("TIERED_MULTIPLIERS") {
        Ok(spec) if !spec.trim().is_empty() => Some(
            parse_tiered_multipliers(&spec)
                .map_err(|e| BotError::configuration("TIERED_MULTIPLIERS", e.message))?,
        ),
        _ => None,
    };

    Ok(CopyStrategyConfig {
        strategy,
        copy_size: parse_var("COPY_SIZE", defaults.copy_size)?,
        max_order_size_usd: parse_var("MAX_ORDER_SIZE_USD", defaults.max_order_size_usd)?,
        min_order_size_usd: parse_var("MIN_ORDER_SIZE_USD", defaults.min_order_size_usd)?,
        max_position_size_usd: parse_opt("MAX_POSITION_SIZE_USD")?,
        adaptive_min_percent: parse_opt("ADAPTIVE_MIN_PERCENT")?,
        adaptive_max_percent: parse_opt("ADAPTIVE_MAX_PERCENT")?,
        adaptive_threshold: parse_opt("ADAPTIVE_THRESHOLD")?,
        trade_multiplier: parse_opt("TRADE_MULTIPLIER")?,
        tiered_multipliers,
    })
}
