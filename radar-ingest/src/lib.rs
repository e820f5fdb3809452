//! radar-ingest library interface
//!
//! Exposes the ingestion pipeline and HTTP API for the binary and for
//! integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod history;
pub mod ingest;
pub mod source;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::cache::SnapshotCache;
use crate::history::HistoryStore;
use crate::ingest::StatusHandle;

/// Application state shared across handlers
///
/// Handlers only read: the ingestion loop is the sole writer to both sinks.
#[derive(Clone)]
pub struct AppState {
    pub history: Arc<dyn HistoryStore>,
    pub cache: Arc<dyn SnapshotCache>,
    pub status: StatusHandle,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        cache: Arc<dyn SnapshotCache>,
        status: StatusHandle,
    ) -> Self {
        Self {
            history,
            cache,
            status,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::flight_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
