use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use mirrorbot::chain::{BalanceProbe, BalanceSource, FixedBalance};
use mirrorbot::config::AppConfig;
use mirrorbot::db::{self, ActivityStore, MemoryActivityStore, PgActivityStore};
use mirrorbot::errors::BotError;
use mirrorbot::exchange::{ClobOrderClient, DataClient, DryRunOrderClient, OrderClient};
use mirrorbot::execution::{ExecutionEngine, TradeAggregator, TradeValidator};
use mirrorbot::metrics;
use mirrorbot::net::RetryingFetcher;
use mirrorbot::resilience::BreakerRegistry;
use mirrorbot::services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls CryptoProvider");

    dotenvy::dotenv().ok();
    init_tracing();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            e.log("load configuration", true);
            std::process::exit(1);
        }
    };

    let _metrics_handle = metrics::init_metrics();
    tracing::info!("Prometheus metrics initialized");

    // --- Persistence ---
    let store: Arc<dyn ActivityStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = db::init_pool(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Database connected, migrations applied");
            Arc::new(PgActivityStore::new(pool))
        }
        None => {
            tracing::warn!("No DATABASE_URL — dry-run with in-memory activity store");
            Arc::new(MemoryActivityStore::new())
        }
    };

    // --- Resilience layer ---
    let breakers = Arc::new(BreakerRegistry::new());
    let fetcher = RetryingFetcher::new(config.fetcher_config()).map_err(anyhow::Error::new)?;
    let data_client = DataClient::new(fetcher, config.data_api_url.clone(), &breakers);

    // --- Balance source ---
    let balance: Arc<dyn BalanceSource> = if config.dry_run {
        tracing::info!(bankroll = %config.bankroll, "Dry-run balance source");
        Arc::new(FixedBalance(config.bankroll))
    } else {
        Arc::new(BalanceProbe::new(
            &breakers,
            config.rpc_url.clone(),
            config.usdc_contract_address.clone(),
        ))
    };

    // --- Order client ---
    let order_client: Arc<dyn OrderClient> = if config.dry_run {
        tracing::info!("Copy engine running in DRY-RUN mode");
        Arc::new(DryRunOrderClient)
    } else {
        tracing::info!("Copy engine running in LIVE mode");
        Arc::new(ClobOrderClient::new(
            reqwest::Client::new(),
            config.clob_api_url.clone(),
        ))
    };

    // --- Execution engine ---
    let shutdown = Arc::new(AtomicBool::new(false));
    let validator = TradeValidator::new(
        config.copy.clone(),
        Duration::from_secs(config.max_activity_age_secs),
    );
    let aggregator = Arc::new(TradeAggregator::new(
        Duration::from_secs(config.trade_aggregation_window_seconds),
        config.copy.min_order_size_usd,
    ));
    let engine = Arc::new(ExecutionEngine::new(
        Arc::clone(&store),
        order_client,
        balance,
        validator,
        aggregator,
        config.aggregation_enabled(),
        config.follower_address.clone(),
        Arc::clone(&shutdown),
    ));

    if config.aggregation_enabled() {
        tracing::info!(
            window_secs = config.trade_aggregation_window_seconds,
            "Trade aggregation enabled"
        );
        let drain_engine = Arc::clone(&engine);
        tokio::spawn(async move {
            services::run_aggregation_drain(drain_engine, Duration::from_secs(1)).await;
        });
    } else {
        tracing::info!("Trade aggregation disabled — mirroring fills directly");
    }

    // --- Leader poller ---
    {
        let poller_engine = Arc::clone(&engine);
        let poller_store = Arc::clone(&store);
        let leaders = config.leader_addresses.clone();
        let interval = config.poll_interval_secs;
        let limit = config.fetch_limit;
        tokio::spawn(async move {
            services::leader_poller::run_leader_poller(
                data_client,
                poller_store,
                poller_engine,
                leaders,
                interval,
                limit,
            )
            .await;
        });
    }

    tracing::info!(
        leaders = config.leader_addresses.len(),
        strategy = %config.copy.strategy,
        dry_run = config.dry_run,
        "Copy-trading bot started"
    );

    // --- Run until ctrl-c or a critical error trips the shutdown flag ---
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
                break;
            }
            _ = ticker.tick() => {
                if engine.shutdown_requested() {
                    let err = BotError::configuration(
                        "SHUTDOWN",
                        "critical non-retryable error triggered shutdown",
                    );
                    err.log("main", true);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
