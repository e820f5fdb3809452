//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::LoopState;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", "degraded" or "stopped"
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub loop_state: LoopState,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub consecutive_failures: u64,
    pub unexpected_failures: u64,
    pub records_persisted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let status = state.status.snapshot().await;

    Json(HealthResponse {
        status: status.health().to_string(),
        module: "radar-ingest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        loop_state: status.state,
        cycles_completed: status.cycles_completed,
        cycles_failed: status.cycles_failed,
        consecutive_failures: status.consecutive_failures,
        unexpected_failures: status.unexpected_failures,
        records_persisted: status.records_persisted,
        last_success_at: status.last_success_at,
        last_error: status.last_error,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
