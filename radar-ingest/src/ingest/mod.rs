//! Ingestion loop
//!
//! One background task polls the source, normalizes the batch and writes it
//! to both sinks, forever, until its cancellation token fires.
//!
//! Per cycle:
//! 1. fetch the region (bounded by the fetch timeout)
//! 2. on fetch failure: log, wait the error backoff, start over
//! 3. normalize, drop rejects
//! 4. if anything survived: append history (one transaction), then
//!    upsert the snapshot cache and refresh its TTL; each sink fails alone
//! 5. wait the normal cadence
//!
//! [`IngestionSupervisor`] owns the task and refuses to start a second one.

mod runner;
mod status;
mod supervisor;

pub use runner::IngestionLoop;
pub use status::{IngestionStatus, LoopState, StatusHandle};
pub use supervisor::{IngestionSupervisor, SupervisorError};

use radar_common::config::{
    DEFAULT_BACKOFF_SECS, DEFAULT_CACHE_TTL_SECS, DEFAULT_CADENCE_SECS,
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_PRUNE_INTERVAL_SECS, DEFAULT_RETENTION_SECS,
};
use radar_common::BoundingBox;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::source::FetchError;

/// Timing and scope of the ingestion loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub region: BoundingBox,
    pub fetch_timeout: Duration,
    /// Wait after a successful cycle
    pub cadence: Duration,
    /// Wait after a failed cycle
    pub backoff: Duration,
    pub cache_ttl_secs: u64,
    /// History retention; `None` keeps everything
    pub retention: Option<Duration>,
    pub prune_interval: Duration,
}

impl LoopConfig {
    /// Defaults for everything except the region
    pub fn new(region: BoundingBox) -> Self {
        Self {
            region,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            cadence: Duration::from_secs(DEFAULT_CADENCE_SECS),
            backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            retention: Some(Duration::from_secs(DEFAULT_RETENTION_SECS)),
            prune_interval: Duration::from_secs(DEFAULT_PRUNE_INTERVAL_SECS),
        }
    }
}

/// Why a cycle ended early
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Anything the cycle did not anticipate (a panic in a component)
    #[error("Unexpected cycle failure: {0}")]
    Unexpected(String),
}

/// What happened to one sink during a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum SinkOutcome {
    /// Nothing to write
    Skipped,
    Written(u64),
    Failed(String),
}

/// Summary of a completed cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub history: SinkOutcome,
    pub cache: SinkOutcome,
    /// Rows removed by retention, when a prune ran this cycle
    pub pruned: Option<u64>,
}

impl CycleReport {
    fn new(fetched: usize, accepted: usize, rejected: usize) -> Self {
        Self {
            fetched,
            accepted,
            rejected,
            history: SinkOutcome::Skipped,
            cache: SinkOutcome::Skipped,
            pruned: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_config_defaults() {
        let region = BoundingBox::new(6.55, 68.11, 35.67, 97.40).unwrap();
        let config = LoopConfig::new(region);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.cadence, Duration::from_secs(30));
        assert_eq!(config.backoff, Duration::from_secs(60));
        assert_eq!(config.cache_ttl_secs, 120);
        assert!(config.backoff >= config.cadence * 2);
    }

    #[test]
    fn test_fetch_error_converts_transparently() {
        let err: CycleError = FetchError::Timeout(Duration::from_secs(10)).into();
        assert!(matches!(err, CycleError::Fetch(FetchError::Timeout(_))));
        assert_eq!(
            err.to_string(),
            FetchError::Timeout(Duration::from_secs(10)).to_string()
        );
    }

    #[test]
    fn test_sink_outcome_serializes_tagged() {
        let json = serde_json::to_value(SinkOutcome::Written(3)).unwrap();
        assert_eq!(json["outcome"], "written");
        assert_eq!(json["detail"], 3);
    }
}
