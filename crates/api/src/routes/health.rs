use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;
use crate::ws::ViewerStats;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the database is reachable.
    pub db_healthy: bool,
    /// Jobs waiting for a worker.
    pub queued: usize,
    /// Jobs currently being generated.
    pub running: usize,
    pub max_concurrent: usize,
    /// Live feed viewers and the updates they have lost to lag.
    pub feed: ViewerStats,
}

/// GET /health -- returns service, database and queue health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = aigpic_db::health_check(&state.pool).await.is_ok();
    let stats = state.orchestrator.stats();
    let feed = state.viewers.stats().await;

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        queued: stats.queued,
        running: stats.running,
        max_concurrent: stats.max_concurrent,
        feed,
    })
}

/// Mount health check routes at the root level.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
