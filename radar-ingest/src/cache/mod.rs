//! Geo-indexed snapshot cache
//!
//! Holds the current best-known position per aircraft in a single geo-index
//! with one TTL for the whole index. Entries are never expired individually:
//! if the ingestion loop stops refreshing, the index lapses as a whole.
//!
//! Writes are best-effort. A [`CacheError`] never stops history persistence.

mod memory;
mod redis;

pub use self::memory::MemorySnapshotCache;
pub use self::redis::RedisSnapshotCache;

use async_trait::async_trait;
use radar_common::{BoundingBox, FlightPosition};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Mean earth radius used by Redis geo commands, in kilometers
pub const EARTH_RADIUS_KM: f64 = 6372.797560856;

/// Latitude limit of Redis geo encoding (EPSG:3857)
pub const MAX_GEO_LATITUDE: f64 = 85.05112878;

/// Whether a point can be placed in the geo-index
///
/// Redis rejects a whole GEOADD if any pair is out of range, so both
/// backends skip such points individually.
pub fn is_indexable(longitude: f64, latitude: f64) -> bool {
    (-180.0..=180.0).contains(&longitude)
        && (-MAX_GEO_LATITUDE..=MAX_GEO_LATITUDE).contains(&latitude)
}

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend unreachable or rejected the command (recoverable)
    #[error("Snapshot cache unavailable: {0}")]
    Unavailable(String),

    /// Connection string could not be used
    #[error("Invalid cache URL: {0}")]
    InvalidUrl(String),
}

impl From<::redis::RedisError> for CacheError {
    fn from(err: ::redis::RedisError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

/// One aircraft to place in the index
#[derive(Debug, Clone, PartialEq)]
pub struct GeoEntry {
    pub entity_id: String,
    pub label: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl From<&FlightPosition> for GeoEntry {
    fn from(position: &FlightPosition) -> Self {
        Self {
            entity_id: position.entity_id.clone(),
            label: position.label.clone(),
            longitude: position.longitude,
            latitude: position.latitude,
        }
    }
}

/// One aircraft returned by a range query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoMember {
    pub entity_id: String,
    /// Absent if the label table lapsed or was never written for this member
    pub label: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    /// Distance from the query center (radius queries only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

/// Geo-index over the latest aircraft positions
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Add or move members. Does not touch the index expiry.
    async fn upsert_many(&self, entries: &[GeoEntry]) -> Result<(), CacheError>;

    /// Reset the expiry of the whole index to `seconds` from now
    async fn refresh_ttl(&self, seconds: u64) -> Result<(), CacheError>;

    /// Members within `radius_km` of a point, nearest first
    async fn within_radius(
        &self,
        longitude: f64,
        latitude: f64,
        radius_km: f64,
    ) -> Result<Vec<GeoMember>, CacheError>;

    /// Members inside a bounding box, ordered by entity id
    async fn within_box(&self, region: &BoundingBox) -> Result<Vec<GeoMember>, CacheError>;
}

/// Open the cache named by `url`
///
/// `memory://` gives an in-process index; `redis://` and `rediss://` give a
/// Redis-backed one keyed by `index_name`. Redis connects lazily, so an
/// unreachable server is reported on first use, not here.
pub fn connect(url: &str, index_name: &str) -> Result<Arc<dyn SnapshotCache>, CacheError> {
    if url.starts_with("memory://") {
        tracing::info!("Using in-process snapshot cache");
        return Ok(Arc::new(MemorySnapshotCache::new()));
    }

    if url.starts_with("redis://") || url.starts_with("rediss://") || url.starts_with("redis+unix://")
    {
        let cache = RedisSnapshotCache::new(url, index_name)?;
        tracing::info!(index = index_name, "Using Redis snapshot cache");
        return Ok(Arc::new(cache));
    }

    Err(CacheError::InvalidUrl(format!(
        "unsupported scheme in '{}' (expected memory://, redis:// or rediss://)",
        url
    )))
}

/// Great-circle distance between two points in kilometers
pub fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
