use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe the job metrics.
///
/// Can only succeed once per process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("media_jobs_submitted_total", "Media jobs accepted for processing");
    metrics::describe_counter!("media_jobs_completed_total", "Media jobs completed");
    metrics::describe_counter!(
        "media_jobs_failed_total",
        "Media jobs that failed, by error code"
    );
    metrics::describe_histogram!(
        "media_job_stage_seconds",
        "Time spent in each pipeline stage"
    );
    metrics::describe_gauge!(
        "media_queue_depth",
        "Dispatch messages waiting for a worker"
    );

    Ok(handle)
}

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
