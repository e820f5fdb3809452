//! Redis-backed snapshot cache
//!
//! Two keys per region:
//! - `<index>`: geo set, member = entity id
//! - `<index>:labels`: hash, entity id → label
//!
//! Both receive the same `EXPIRE` so the label table never outlives the
//! geo-index.

use ::redis::aio::ConnectionManager;
use ::redis::Client;
use async_trait::async_trait;
use radar_common::BoundingBox;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{is_indexable, CacheError, GeoEntry, GeoMember, SnapshotCache};

const KM_PER_DEGREE: f64 = 111.32;

// One quick retry; the ingestion loop owns the longer backoff
const RECONNECT_BACKOFF_BASE: u64 = 2;
const RECONNECT_BACKOFF_FACTOR_MS: u64 = 100;
const RECONNECT_RETRIES: usize = 1;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw GEOSEARCH reply with WITHDIST and WITHCOORD
type SearchRow = (String, f64, (f64, f64));

pub struct RedisSnapshotCache {
    client: Client,
    index_key: String,
    labels_key: String,
    conn: Mutex<Option<ConnectionManager>>,
}

impl RedisSnapshotCache {
    /// Parse the URL; no connection is made until the first command
    pub fn new(url: &str, index_name: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|e| CacheError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client,
            index_key: index_name.to_string(),
            labels_key: format!("{}:labels", index_name),
            conn: Mutex::new(None),
        })
    }

    pub fn index_key(&self) -> &str {
        &self.index_key
    }

    pub fn labels_key(&self) -> &str {
        &self.labels_key
    }

    /// Shared connection, established on first use
    ///
    /// The manager reconnects by itself after a drop, so it is cached
    /// once it has connected successfully.
    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_tokio_connection_manager_with_backoff_and_timeouts(
                RECONNECT_BACKOFF_BASE,
                RECONNECT_BACKOFF_FACTOR_MS,
                RECONNECT_RETRIES,
                RESPONSE_TIMEOUT,
                CONNECT_TIMEOUT,
            )
            .await?;
        debug!(index = %self.index_key, "Connected to Redis");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Attach labels from the side table to search results
    async fn with_labels(
        &self,
        conn: &mut ConnectionManager,
        rows: Vec<SearchRow>,
        with_distance: bool,
    ) -> Result<Vec<GeoMember>, CacheError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = rows.iter().map(|(id, _, _)| id.as_str()).collect();
        let labels: Vec<Option<String>> = ::redis::cmd("HMGET")
            .arg(&self.labels_key)
            .arg(&ids)
            .query_async(conn)
            .await?;

        Ok(rows
            .into_iter()
            .zip(labels.into_iter().chain(std::iter::repeat(None)))
            .map(|((entity_id, distance, (longitude, latitude)), label)| GeoMember {
                entity_id,
                label,
                longitude,
                latitude,
                distance_km: with_distance.then_some(distance),
            })
            .collect())
    }
}

/// Box dimensions in km large enough to cover the whole region
///
/// A degree of longitude is widest at the latitude closest to the equator,
/// so the width is taken there rather than at the center.
fn search_extent_km(region: &BoundingBox) -> (f64, f64) {
    let widest_lat = if region.lamin <= 0.0 && region.lamax >= 0.0 {
        0.0
    } else {
        region.lamin.abs().min(region.lamax.abs())
    };
    let width = (region.lomax - region.lomin) * KM_PER_DEGREE * widest_lat.to_radians().cos();
    let height = (region.lamax - region.lamin) * KM_PER_DEGREE;
    // Slack for the difference between Redis' sphere and the degree approximation
    (width * 1.01 + 1.0, height * 1.01 + 1.0)
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn upsert_many(&self, entries: &[GeoEntry]) -> Result<(), CacheError> {
        let indexable: Vec<&GeoEntry> = entries
            .iter()
            .filter(|e| is_indexable(e.longitude, e.latitude))
            .collect();

        let skipped = entries.len() - indexable.len();
        if skipped > 0 {
            debug!(skipped, "Skipped positions outside the geo-index range");
        }
        if indexable.is_empty() {
            return Ok(());
        }

        let mut geoadd = ::redis::cmd("GEOADD");
        geoadd.arg(&self.index_key);
        let mut hset = ::redis::cmd("HSET");
        hset.arg(&self.labels_key);
        for entry in &indexable {
            geoadd
                .arg(entry.longitude)
                .arg(entry.latitude)
                .arg(&entry.entity_id);
            hset.arg(&entry.entity_id).arg(&entry.label);
        }

        let mut pipe = ::redis::pipe();
        pipe.atomic();
        pipe.add_command(geoadd).ignore();
        pipe.add_command(hset).ignore();

        let mut conn = self.connection().await?;
        let _: () = pipe.query_async(&mut conn).await?;

        debug!(index = %self.index_key, members = indexable.len(), "Upserted snapshot members");
        Ok(())
    }

    async fn refresh_ttl(&self, seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = ::redis::pipe()
            .atomic()
            .cmd("EXPIRE")
            .arg(&self.index_key)
            .arg(seconds)
            .ignore()
            .cmd("EXPIRE")
            .arg(&self.labels_key)
            .arg(seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn within_radius(
        &self,
        longitude: f64,
        latitude: f64,
        radius_km: f64,
    ) -> Result<Vec<GeoMember>, CacheError> {
        let mut conn = self.connection().await?;
        let rows: Vec<SearchRow> = ::redis::cmd("GEOSEARCH")
            .arg(&self.index_key)
            .arg("FROMLONLAT")
            .arg(longitude)
            .arg(latitude)
            .arg("BYRADIUS")
            .arg(radius_km)
            .arg("km")
            .arg("ASC")
            .arg("WITHCOORD")
            .arg("WITHDIST")
            .query_async(&mut conn)
            .await?;

        self.with_labels(&mut conn, rows, true).await
    }

    async fn within_box(&self, region: &BoundingBox) -> Result<Vec<GeoMember>, CacheError> {
        let (center_lon, center_lat) = region.center();
        let (width_km, height_km) = search_extent_km(region);

        let mut conn = self.connection().await?;
        let rows: Vec<SearchRow> = ::redis::cmd("GEOSEARCH")
            .arg(&self.index_key)
            .arg("FROMLONLAT")
            .arg(center_lon)
            .arg(center_lat)
            .arg("BYBOX")
            .arg(width_km)
            .arg(height_km)
            .arg("km")
            .arg("WITHCOORD")
            .arg("WITHDIST")
            .query_async(&mut conn)
            .await?;

        // BYBOX is metric; trim back to the degree box
        let mut rows: Vec<SearchRow> = rows
            .into_iter()
            .filter(|(_, _, (lon, lat))| region.contains(*lon, *lat))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        self.with_labels(&mut conn, rows, false).await
    }
}
