use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::expiry::{ExpiryScheduler, SchedulerStatus};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<ExpiryScheduler>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub expiry_worker: SchedulerStatus,
}

/// GET /health - Health check
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let expiry_worker = state.scheduler.status();

    Json(HealthResponse {
        status: if expiry_worker.running {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: Utc::now(),
        expiry_worker,
    })
}

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    Router::new()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server<F>(app: Router, bind_address: &str, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
