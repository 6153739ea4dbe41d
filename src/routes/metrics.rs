use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!("style_jobs_completed", "Queued styling jobs completed");
    metrics::describe_counter!("style_jobs_failed", "Queued styling jobs that failed");
    metrics::describe_counter!(
        "style_jobs_abandoned",
        "Jobs failed after being left in processing past the stale limit"
    );
    metrics::describe_counter!(
        "style_sync_generations_total",
        "Images generated through the synchronous endpoint"
    );
    metrics::describe_histogram!(
        "style_generation_seconds",
        "Latency of successful generation API calls"
    );
    metrics::describe_gauge!(
        "style_jobs_claimed_last_pass",
        "Jobs claimed by the most recent processor pass"
    );
}

/// GET /metrics: Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
