use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::time::sleep;

use crate::db::ActivityStore;
use crate::exchange::DataClient;
use crate::execution::ExecutionEngine;

/// Poll each configured leader's recent fills via the data API.
///
/// Flow per cycle:
/// 1. For each leader, fetch recent fills (retrying fetcher under the
///    "data-api" breaker).
/// 2. Insert fills the store has not seen; known ids are ignored.
/// 3. Hand every unseen activity to the execution engine, which claims it
///    and either mirrors, buffers, or skips.
///
/// The loop exits when the engine requests shutdown.
pub async fn run_leader_poller(
    data_client: DataClient,
    store: Arc<dyn ActivityStore>,
    engine: Arc<ExecutionEngine>,
    leaders: Vec<String>,
    interval_secs: u64,
    fetch_limit: u32,
) {
    tracing::info!(
        leaders = leaders.len(),
        interval_secs,
        "Leader trade poller started"
    );

    loop {
        sleep(Duration::from_secs(interval_secs)).await;

        if engine.shutdown_requested() {
            tracing::warn!("Shutdown requested — leader poller stopping");
            return;
        }

        let cycle_start = Instant::now();
        let mut fetched = 0u32;
        let mut inserted = 0u32;

        for leader in &leaders {
            let activities = match data_client.get_leader_activities(leader, fetch_limit).await {
                Ok(a) => a,
                Err(e) => {
                    e.log(&format!("poll leader {leader}"), false);
                    continue;
                }
            };
            fetched += activities.len() as u32;

            for activity in &activities {
                match store.insert_new(activity).await {
                    Ok(true) => inserted += 1,
                    Ok(false) => {}
                    Err(e) => e.log(&format!("insert activity {}", activity.id), true),
                }
            }
        }

        if inserted > 0 {
            counter!("activities_ingested_total").increment(inserted as u64);
            tracing::info!(fetched, inserted, "Poller cycle found new leader fills");
        }

        // Drive everything still unseen, including leftovers from earlier
        // cycles that never got claimed.
        let unseen = match store.unseen_activities().await {
            Ok(u) => u,
            Err(e) => {
                e.log("load unseen activities", true);
                continue;
            }
        };

        for activity in &unseen {
            if engine.shutdown_requested() {
                tracing::warn!("Shutdown requested — leader poller stopping");
                return;
            }
            if let Err(e) = engine.execute_trade(activity).await {
                e.log(&format!("execute activity {}", activity.id), true);
            }
        }

        histogram!("poll_cycle_seconds").record(cycle_start.elapsed().as_secs_f64());
    }
}
