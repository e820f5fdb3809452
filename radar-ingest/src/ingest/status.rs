//! Shared loop status read by the health endpoint

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CycleError, CycleReport, SinkOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Running,
    #[default]
    Stopped,
}

/// Counters and last-seen values for the ingestion loop
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionStatus {
    pub state: LoopState,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub consecutive_failures: u64,
    /// Panics caught by the cycle barrier; these need an operator
    pub unexpected_failures: u64,
    pub records_persisted: u64,
    pub history_failures: u64,
    pub cache_failures: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_cycle: Option<CycleReport>,
}

impl IngestionStatus {
    /// `ok`, `degraded` or `stopped`
    pub fn health(&self) -> &'static str {
        match self.state {
            LoopState::Stopped => "stopped",
            LoopState::Running if self.consecutive_failures > 0 => "degraded",
            LoopState::Running => {
                let sink_failed = self.last_cycle.as_ref().map_or(false, |report| {
                    matches!(report.history, SinkOutcome::Failed(_))
                        || matches!(report.cache, SinkOutcome::Failed(_))
                });
                if sink_failed {
                    "degraded"
                } else {
                    "ok"
                }
            }
        }
    }
}

/// Cloneable handle to the loop's status
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<IngestionStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> IngestionStatus {
        self.inner.read().await.clone()
    }

    pub async fn set_state(&self, state: LoopState) {
        self.inner.write().await.state = state;
    }

    pub async fn record_success(&self, report: &CycleReport) {
        let mut status = self.inner.write().await;
        status.cycles_completed += 1;
        status.consecutive_failures = 0;
        status.last_success_at = Some(radar_common::time::now());

        match &report.history {
            SinkOutcome::Written(rows) => status.records_persisted += rows,
            SinkOutcome::Failed(e) => {
                status.history_failures += 1;
                status.last_error = Some(e.clone());
            }
            SinkOutcome::Skipped => {}
        }
        if let SinkOutcome::Failed(e) = &report.cache {
            status.cache_failures += 1;
            status.last_error = Some(e.clone());
        }

        status.last_cycle = Some(report.clone());
    }

    pub async fn record_failure(&self, error: &CycleError) {
        let mut status = self.inner.write().await;
        status.cycles_failed += 1;
        status.consecutive_failures += 1;
        if matches!(error, CycleError::Unexpected(_)) {
            status.unexpected_failures += 1;
        }
        status.last_error = Some(error.to_string());
    }
}
