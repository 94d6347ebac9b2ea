pub mod leader_poller;

use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::time::sleep;

use crate::execution::ExecutionEngine;

/// Periodically drain aggregation buckets whose window has elapsed.
///
/// Readiness is pull-based: the aggregator never fires on its own, this
/// loop polls it. A tick of one second keeps flush latency well under the
/// configured window without busy-waiting.
pub async fn run_aggregation_drain(engine: Arc<ExecutionEngine>, tick: Duration) {
    tracing::info!(tick_ms = tick.as_millis() as u64, "Aggregation drain loop started");

    loop {
        sleep(tick).await;

        if engine.shutdown_requested() {
            tracing::warn!("Shutdown requested — aggregation drain stopping");
            return;
        }

        if let Err(e) = engine.execute_aggregated_trades().await {
            e.log("aggregation drain", true);
        }
        gauge!("aggregation_buffer_size").set(engine.aggregator().buffer_size() as f64);
    }
}
