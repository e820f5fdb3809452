//! In-process snapshot cache
//!
//! Same semantics as the Redis index: one expiry for the whole index, set
//! only by `refresh_ttl`, refreshing a missing index is a no-op, and points
//! outside the geo range are skipped. Time is read from the tokio clock so
//! paused-time tests can step past the TTL.

use async_trait::async_trait;
use radar_common::BoundingBox;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{haversine_km, is_indexable, CacheError, GeoEntry, GeoMember, SnapshotCache};

#[derive(Debug, Default)]
struct Index {
    members: HashMap<String, GeoEntry>,
    expires_at: Option<Instant>,
}

impl Index {
    /// Drop everything once the deadline has passed
    fn purge_expired(&mut self) {
        if let Some(deadline) = self.expires_at {
            if Instant::now() >= deadline {
                self.members.clear();
                self.expires_at = None;
            }
        }
    }
}

/// Snapshot cache held in process memory
#[derive(Debug, Default)]
pub struct MemorySnapshotCache {
    index: Mutex<Index>,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live members
    pub async fn len(&self) -> usize {
        let mut index = self.index.lock().await;
        index.purge_expired();
        index.members.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Time left before the index lapses, if an expiry is set
    pub async fn ttl(&self) -> Option<Duration> {
        let mut index = self.index.lock().await;
        index.purge_expired();
        index
            .expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

fn to_member(entry: &GeoEntry, distance_km: Option<f64>) -> GeoMember {
    GeoMember {
        entity_id: entry.entity_id.clone(),
        label: Some(entry.label.clone()),
        longitude: entry.longitude,
        latitude: entry.latitude,
        distance_km,
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn upsert_many(&self, entries: &[GeoEntry]) -> Result<(), CacheError> {
        let mut index = self.index.lock().await;
        index.purge_expired();
        for entry in entries
            .iter()
            .filter(|e| is_indexable(e.longitude, e.latitude))
        {
            index.members.insert(entry.entity_id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn refresh_ttl(&self, seconds: u64) -> Result<(), CacheError> {
        let mut index = self.index.lock().await;
        index.purge_expired();
        if !index.members.is_empty() {
            // A deadline past the clock's range never lapses
            index.expires_at = Instant::now().checked_add(Duration::from_secs(seconds));
        }
        Ok(())
    }

    async fn within_radius(
        &self,
        longitude: f64,
        latitude: f64,
        radius_km: f64,
    ) -> Result<Vec<GeoMember>, CacheError> {
        let mut index = self.index.lock().await;
        index.purge_expired();

        let mut members: Vec<GeoMember> = index
            .members
            .values()
            .filter_map(|entry| {
                let distance = haversine_km(longitude, latitude, entry.longitude, entry.latitude);
                (distance <= radius_km).then(|| to_member(entry, Some(distance)))
            })
            .collect();

        members.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(members)
    }

    async fn within_box(&self, region: &BoundingBox) -> Result<Vec<GeoMember>, CacheError> {
        let mut index = self.index.lock().await;
        index.purge_expired();

        let mut members: Vec<GeoMember> = index
            .members
            .values()
            .filter(|entry| region.contains(entry.longitude, entry.latitude))
            .map(|entry| to_member(entry, None))
            .collect();

        members.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, lon: f64, lat: f64) -> GeoEntry {
        GeoEntry {
            entity_id: id.to_string(),
            label: format!("CS-{}", id),
            longitude: lon,
            latitude: lat,
        }
    }

    fn india() -> BoundingBox {
        BoundingBox::new(6.55, 68.11, 35.67, 97.40).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_lapses_after_ttl_without_refresh() {
        let cache = MemorySnapshotCache::new();
        cache.upsert_many(&[entry("a", 77.5, 28.6)]).await.unwrap();
        cache.refresh_ttl(120).await.unwrap();

        tokio::time::advance(Duration::from_secs(119)).await;
        assert_eq!(cache.within_box(&india()).await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.within_box(&india()).await.unwrap().is_empty());
        assert!(cache.ttl().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_extends_expiry() {
        let cache = MemorySnapshotCache::new();
        cache.upsert_many(&[entry("a", 77.5, 28.6)]).await.unwrap();
        cache.refresh_ttl(120).await.unwrap();

        tokio::time::advance(Duration::from_secs(100)).await;
        cache.refresh_ttl(120).await.unwrap();
        tokio::time::advance(Duration::from_secs(100)).await;

        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_does_not_reset_expiry() {
        let cache = MemorySnapshotCache::new();
        cache.upsert_many(&[entry("a", 77.5, 28.6)]).await.unwrap();
        cache.refresh_ttl(120).await.unwrap();

        tokio::time::advance(Duration::from_secs(100)).await;
        cache.upsert_many(&[entry("b", 78.0, 28.0)]).await.unwrap();
        tokio::time::advance(Duration::from_secs(21)).await;

        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_refresh_on_missing_index_is_noop() {
        let cache = MemorySnapshotCache::new();
        cache.refresh_ttl(120).await.unwrap();
        assert!(cache.ttl().await.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_entries_skipped_individually() {
        let cache = MemorySnapshotCache::new();
        cache
            .upsert_many(&[
                entry("good", 77.5, 28.6),
                entry("wrapped", 200.0, 10.0),
                entry("polar", 10.0, 89.0),
            ])
            .await
            .unwrap();
        cache.refresh_ttl(120).await.unwrap();

        assert_eq!(cache.len().await, 1);
        assert!(cache.ttl().await.is_some());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_panic() {
        let cache = MemorySnapshotCache::new();
        cache.upsert_many(&[entry("a", 77.5, 28.6)]).await.unwrap();

        cache.refresh_ttl(u64::MAX).await.unwrap();

        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_moves_existing_member() {
        let cache = MemorySnapshotCache::new();
        cache.upsert_many(&[entry("a", 77.5, 28.6)]).await.unwrap();
        cache.upsert_many(&[entry("a", 80.0, 20.0)]).await.unwrap();

        let members = cache.within_box(&india()).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!((members[0].longitude, members[0].latitude), (80.0, 20.0));
    }

    #[tokio::test]
    async fn test_within_radius_orders_by_distance() {
        let cache = MemorySnapshotCache::new();
        cache
            .upsert_many(&[
                entry("far", 78.5, 28.6),
                entry("near", 77.6, 28.6),
                entry("out", 72.8, 19.0),
            ])
            .await
            .unwrap();

        let members = cache.within_radius(77.5, 28.6, 200.0).await.unwrap();

        let ids: Vec<&str> = members.iter().map(|m| m.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert!(members[0].distance_km.unwrap() < 15.0);
        assert_eq!(members[0].label.as_deref(), Some("CS-near"));
    }

    #[tokio::test]
    async fn test_within_box_filters_and_sorts() {
        let cache = MemorySnapshotCache::new();
        cache
            .upsert_many(&[
                entry("zz", 77.5, 28.6),
                entry("aa", 72.8, 19.0),
                entry("outside", 120.0, 30.0),
            ])
            .await
            .unwrap();

        let members = cache.within_box(&india()).await.unwrap();

        let ids: Vec<&str> = members.iter().map(|m| m.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["aa", "zz"]);
        assert!(members.iter().all(|m| m.distance_km.is_none()));
    }
}
