//! Durable flight history
//!
//! Append-only time series of accepted positions. Each ingestion cycle is
//! written in one transaction: readers see either all of a cycle's rows or
//! none of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use radar_common::db;
use radar_common::FlightPosition;
use sqlx::error::ErrorKind;
use sqlx::SqlitePool;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// History store errors
///
/// All variants are recoverable at the cycle level.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store unreachable, pool exhausted or closed
    #[error("History store connection lost: {0}")]
    ConnectionLost(String),

    /// A row broke a table constraint; the whole batch was rolled back
    #[error("History constraint violation: {0}")]
    ConstraintViolation(String),

    /// Any other database failure
    #[error("History store error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => StoreError::ConstraintViolation(err.to_string()),
                // Older SQLite builds report plain SQLITE_CONSTRAINT
                _ if db_err.message().contains("constraint failed") => {
                    StoreError::ConstraintViolation(err.to_string())
                }
                _ => StoreError::Backend(err.to_string()),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::ConnectionLost(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

impl From<radar_common::Error> for StoreError {
    fn from(err: radar_common::Error) -> Self {
        match err {
            radar_common::Error::Database(e) => e.into(),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Durable, append-only position history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist one cycle's records atomically, returning the row count
    async fn append_batch(&self, records: &[FlightPosition]) -> Result<u64, StoreError>;

    /// Latest row per aircraft observed within `window` of now, by entity id
    async fn latest_per_entity(&self, window: Duration) -> Result<Vec<FlightPosition>, StoreError>;

    /// Delete rows older than `retention`, returning how many were removed
    async fn prune_older_than(&self, retention: Duration) -> Result<u64, StoreError>;
}

/// SQLite-backed history
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// [`HistoryStore::latest_per_entity`] against a fixed clock
    pub async fn latest_per_entity_at(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<FlightPosition>, StoreError> {
        Ok(db::latest_per_entity_at(&self.pool, window, now).await?)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append_batch(&self, records: &[FlightPosition]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            // Dropping `tx` on error rolls the batch back
            db::insert_position(&mut *tx, record).await?;
        }
        tx.commit().await?;

        debug!(rows = records.len(), "Committed history batch");
        Ok(records.len() as u64)
    }

    async fn latest_per_entity(&self, window: Duration) -> Result<Vec<FlightPosition>, StoreError> {
        Ok(db::latest_per_entity(&self.pool, window).await?)
    }

    async fn prune_older_than(&self, retention: Duration) -> Result<u64, StoreError> {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| radar_common::time::now().checked_sub_signed(retention))
            .unwrap_or_default();

        let removed = db::prune_before(&self.pool, cutoff).await?;
        if removed > 0 {
            debug!(removed, "Pruned history rows");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_common::db::init_database;
    use radar_common::time::{from_unix_millis, now};

    fn position(id: &str, millis: i64) -> FlightPosition {
        FlightPosition {
            entity_id: id.to_string(),
            label: "NONE".to_string(),
            longitude: 77.0,
            latitude: 28.0,
            altitude: 0.0,
            velocity: 0.0,
            observed_at: from_unix_millis(millis),
        }
    }

    async fn store() -> SqliteHistoryStore {
        SqliteHistoryStore::new(init_database("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let store = store().await;
        assert_eq!(store.append_batch(&[]).await.unwrap(), 0);
        assert_eq!(db::count_rows(store.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_returns_row_count() {
        let store = store().await;
        let written = store
            .append_batch(&[position("a", 1_000), position("b", 1_000)])
            .await
            .unwrap();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn test_constraint_violation_rolls_back_batch() {
        let store = store().await;
        // Blank id trips the CHECK on the third row
        let batch = vec![position("a", 1_000), position("b", 1_000), position("", 1_000)];

        let result = store.append_batch(&batch).await;

        assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));
        assert_eq!(db::count_rows(store.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_is_connection_lost() {
        let store = store().await;
        store.pool().close().await;

        let result = store.append_batch(&[position("a", 1_000)]).await;

        assert!(matches!(result, Err(StoreError::ConnectionLost(_))));
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_rows() {
        let store = store().await;
        let now_ms = now().timestamp_millis();
        store
            .append_batch(&[position("old", now_ms - 7_200_000), position("new", now_ms)])
            .await
            .unwrap();

        let removed = store.prune_older_than(Duration::from_secs(3600)).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(db::count_rows(store.pool()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_latest_uses_fixed_clock() {
        let store = store().await;
        store.append_batch(&[position("a", 1_000_000)]).await.unwrap();

        let fresh = store
            .latest_per_entity_at(Duration::from_secs(300), from_unix_millis(1_100_000))
            .await
            .unwrap();
        let stale = store
            .latest_per_entity_at(Duration::from_secs(300), from_unix_millis(1_400_000))
            .await
            .unwrap();

        assert_eq!(fresh.len(), 1);
        assert!(stale.is_empty());
    }
}
