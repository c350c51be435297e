use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::scheduler::{JobNode, JobPool};
use crate::worker::JobExecutor;

#[derive(Clone)]
pub struct DashboardState {
    pub pool: Arc<JobPool>,
    pub executor: JobExecutor,
    pub max_concurrent_jobs: usize,
}

#[derive(Serialize)]
struct StatusResponse {
    max_concurrent_jobs: usize,
    pending: usize,
    running: usize,
    in_flight: usize,
}

#[derive(Serialize)]
struct JobResponse {
    namespace: String,
    name: String,
    priority: i32,
    state: Option<String>,
    job_type: Option<String>,
    target: Option<String>,
    created_at_ms: i64,
    start_time_ms: Option<i64>,
}

impl From<&JobNode> for JobResponse {
    fn from(node: &JobNode) -> Self {
        let job = node.job();
        Self {
            namespace: job.namespace.clone(),
            name: job.name.clone(),
            priority: job.priority,
            state: job.state.map(|s| s.to_string()),
            job_type: job.claim.as_ref().map(|c| c.job_type.clone()),
            target: job.claim.as_ref().map(|c| c.target.to_string()),
            created_at_ms: job.created_at.timestamp_millis(),
            start_time_ms: job.start_time.map(|t| t.timestamp_millis()),
        }
    }
}

#[derive(Serialize)]
struct JobsResponse {
    pending: Vec<JobResponse>,
    running: Vec<JobResponse>,
}

/// Read-only routes over the pool.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/jobs", get(list_jobs_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let (pending, running) = {
        let pool = state.pool.lock().await;
        (pool.pending().len(), pool.running().len())
    };

    Json(StatusResponse {
        max_concurrent_jobs: state.max_concurrent_jobs,
        pending,
        running,
        in_flight: state.executor.in_flight_count().await,
    })
}

async fn list_jobs_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let pool = state.pool.lock().await;
    Json(JobsResponse {
        pending: pool.pending().iter().map(JobResponse::from).collect(),
        running: pool.running().iter().map(JobResponse::from).collect(),
    })
}
