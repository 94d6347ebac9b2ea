use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and pre-register the bot's metric
/// series. The returned handle renders the text scrape payload on demand.
///
/// Calling more than once (tests) yields a fresh standalone handle instead
/// of failing on the already-installed global recorder.
pub fn init_metrics() -> PrometheusHandle {
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(h) => h,
        Err(_) => PrometheusBuilder::new().build_recorder().handle(),
    };

    // Register everything up front so scrapes see the full series set
    // before the first trade moves through the pipeline.
    counter!("activities_ingested_total").absolute(0);
    counter!("orders_mirrored").absolute(0);
    counter!("orders_failed").absolute(0);
    counter!("activities_skipped").absolute(0);
    counter!("aggregated_flushes").absolute(0);
    gauge!("aggregation_buffer_size").set(0.0);
    histogram!("poll_cycle_seconds").record(0.0);

    handle
}
