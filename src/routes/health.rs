use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub job_store: ComponentHealth,
    pub queue: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<u64>,
}

impl ComponentHealth {
    fn ok(start: std::time::Instant) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            queue_depth: None,
        }
    }

    fn error() -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
            queue_depth: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health: job store and dispatch queue reachability.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let store_check = match state.store.health_check().await {
        Ok(()) => ComponentHealth::ok(start),
        Err(e) => {
            tracing::warn!(error = %e, "Job store health check failed");
            ComponentHealth::error()
        }
    };

    let queue_start = std::time::Instant::now();
    let queue_check = match state.queue.health_check().await {
        Ok(()) => ComponentHealth {
            queue_depth: state.queue.depth().await.ok(),
            ..ComponentHealth::ok(queue_start)
        },
        Err(e) => {
            tracing::warn!(error = %e, "Queue health check failed");
            ComponentHealth::error()
        }
    };

    let all_healthy = store_check.is_ok() && queue_check.is_ok();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            job_store: store_check,
            queue: queue_check,
        },
    };

    (status_code, Json(response))
}
