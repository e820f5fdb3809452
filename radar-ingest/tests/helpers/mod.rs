//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use radar_common::{BoundingBox, FlightPosition};
use radar_ingest::cache::{CacheError, GeoEntry, GeoMember, SnapshotCache};
use radar_ingest::history::{HistoryStore, StoreError};
use radar_ingest::ingest::LoopConfig;
use radar_ingest::source::{FetchError, RawStateVector, SourceClient};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub fn india() -> BoundingBox {
    BoundingBox::new(6.55, 68.11, 35.67, 97.40).unwrap()
}

pub fn loop_config() -> LoopConfig {
    LoopConfig::new(india())
}

/// Compact-layout raw vector
pub fn raw(value: Value) -> RawStateVector {
    RawStateVector::from(value)
}

pub fn complete_row() -> RawStateVector {
    raw(json!(["ABC123", "AI101 ", 77.5, 28.6, 9000, 230]))
}

pub fn positionless_row() -> RawStateVector {
    raw(json!(["XYZ999", null, null, 19.0, 5000, 100]))
}

pub enum Step {
    Respond(Vec<RawStateVector>),
    Fail(FetchError),
    Panic(&'static str),
}

/// Source that plays back a script, then returns empty batches
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Times (tokio clock) at which `fetch` was called
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    /// Sleep on the tokio clock until at least `n` fetches happened
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls().len() < n {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn fetch(
        &self,
        _region: &BoundingBox,
        _timeout: Duration,
    ) -> Result<Vec<RawStateVector>, FetchError> {
        self.calls.lock().unwrap().push(Instant::now());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(rows)) => Ok(rows),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Panic(msg)) => panic!("{}", msg),
            None => Ok(Vec::new()),
        }
    }
}

/// In-memory history that can be told to fail
#[derive(Default)]
pub struct RecordingHistory {
    rows: Mutex<Vec<FlightPosition>>,
    batches: AtomicUsize,
    prunes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl RecordingHistory {
    pub fn failing() -> Self {
        let history = Self::default();
        history.fail_writes.store(true, Ordering::SeqCst);
        history
    }

    pub fn rows(&self) -> Vec<FlightPosition> {
        self.rows.lock().unwrap().clone()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn prunes(&self) -> usize {
        self.prunes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryStore for RecordingHistory {
    async fn append_batch(&self, records: &[FlightPosition]) -> Result<u64, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionLost("store offline".to_string()));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn latest_per_entity(&self, _window: Duration) -> Result<Vec<FlightPosition>, StoreError> {
        let mut latest: Vec<FlightPosition> = Vec::new();
        for row in self.rows() {
            match latest.iter_mut().find(|p| p.entity_id == row.entity_id) {
                Some(existing) if existing.observed_at <= row.observed_at => *existing = row,
                Some(_) => {}
                None => latest.push(row),
            }
        }
        latest.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(latest)
    }

    async fn prune_older_than(&self, _retention: Duration) -> Result<u64, StoreError> {
        self.prunes.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

/// Cache whose backend is always down
#[derive(Default)]
pub struct UnavailableCache {
    attempts: AtomicUsize,
}

impl UnavailableCache {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotCache for UnavailableCache {
    async fn upsert_many(&self, _entries: &[GeoEntry]) -> Result<(), CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn refresh_ttl(&self, _seconds: u64) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn within_radius(
        &self,
        _longitude: f64,
        _latitude: f64,
        _radius_km: f64,
    ) -> Result<Vec<GeoMember>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn within_box(&self, _region: &BoundingBox) -> Result<Vec<GeoMember>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

/// Cache that accepts the connection but never answers
#[derive(Default)]
pub struct HangingCache {
    attempts: AtomicUsize,
}

impl HangingCache {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotCache for HangingCache {
    async fn upsert_many(&self, _entries: &[GeoEntry]) -> Result<(), CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn refresh_ttl(&self, _seconds: u64) -> Result<(), CacheError> {
        std::future::pending().await
    }

    async fn within_radius(
        &self,
        _longitude: f64,
        _latitude: f64,
        _radius_km: f64,
    ) -> Result<Vec<GeoMember>, CacheError> {
        std::future::pending().await
    }

    async fn within_box(&self, _region: &BoundingBox) -> Result<Vec<GeoMember>, CacheError> {
        std::future::pending().await
    }
}
