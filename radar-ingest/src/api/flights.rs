//! Flight read endpoints
//!
//! `/api/flights/latest` reads the history store (the presentation
//! contract); `/api/flights/nearby` reads the snapshot cache.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use radar_common::config::DEFAULT_READ_WINDOW_SECS;
use radar_common::FlightPosition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::GeoMember;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Largest radius accepted by the nearby query
pub const MAX_RADIUS_KM: f64 = 2000.0;

/// Largest window accepted by the latest query (one day)
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub window_secs: Option<u64>,
}

/// Whether any position is fresh yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    Live,
    /// Nothing inside the window; the loop has not delivered data yet
    WarmingUp,
}

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub status: FeedStatus,
    pub window_secs: u64,
    pub count: usize,
    pub flights: Vec<FlightPosition>,
}

/// GET /api/flights/latest?window_secs=N
pub async fn latest_flights(
    State(state): State<AppState>,
    Query(query): Query<LatestQuery>,
) -> ApiResult<Json<LatestResponse>> {
    let window_secs = query.window_secs.unwrap_or(DEFAULT_READ_WINDOW_SECS);
    if window_secs == 0 || window_secs > MAX_WINDOW_SECS {
        return Err(ApiError::BadRequest(format!(
            "window_secs must be between 1 and {}",
            MAX_WINDOW_SECS
        )));
    }

    let flights = state
        .history
        .latest_per_entity(Duration::from_secs(window_secs))
        .await?;

    let status = if flights.is_empty() {
        FeedStatus::WarmingUp
    } else {
        FeedStatus::Live
    };

    Ok(Json(LatestResponse {
        status,
        window_secs,
        count: flights.len(),
        flights,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lon: f64,
    pub lat: f64,
    pub radius_km: f64,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    pub count: usize,
    pub flights: Vec<GeoMember>,
}

/// GET /api/flights/nearby?lon=..&lat=..&radius_km=..
pub async fn nearby_flights(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> ApiResult<Json<NearbyResponse>> {
    if !(-180.0..=180.0).contains(&query.lon) || !(-90.0..=90.0).contains(&query.lat) {
        return Err(ApiError::BadRequest(format!(
            "coordinates out of range: lon {}, lat {}",
            query.lon, query.lat
        )));
    }
    if !(query.radius_km > 0.0 && query.radius_km <= MAX_RADIUS_KM) {
        return Err(ApiError::BadRequest(format!(
            "radius_km must be in (0, {}]",
            MAX_RADIUS_KM
        )));
    }

    let flights = state
        .cache
        .within_radius(query.lon, query.lat, query.radius_km)
        .await?;

    Ok(Json(NearbyResponse {
        count: flights.len(),
        flights,
    }))
}

pub fn flight_routes() -> Router<AppState> {
    Router::new()
        .route("/api/flights/latest", get(latest_flights))
        .route("/api/flights/nearby", get(nearby_flights))
}
