//! The polling loop itself

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CycleError, CycleReport, LoopConfig, LoopState, SinkOutcome, StatusHandle};
use crate::cache::{CacheError, GeoEntry, SnapshotCache};
use crate::filter;
use crate::history::HistoryStore;
use crate::source::SourceClient;
use radar_common::FlightPosition;

/// Single-producer ingestion loop
///
/// Sole writer to both sinks. Built once, then moved into its task by
/// [`IngestionLoop::run`].
pub struct IngestionLoop {
    source: Arc<dyn SourceClient>,
    history: Arc<dyn HistoryStore>,
    cache: Arc<dyn SnapshotCache>,
    config: LoopConfig,
    status: StatusHandle,
    last_prune: Option<Instant>,
}

impl IngestionLoop {
    pub fn new(
        source: Arc<dyn SourceClient>,
        history: Arc<dyn HistoryStore>,
        cache: Arc<dyn SnapshotCache>,
        config: LoopConfig,
        status: StatusHandle,
    ) -> Self {
        Self {
            source,
            history,
            cache,
            config,
            status,
            last_prune: None,
        }
    }

    /// Poll until `shutdown` fires
    ///
    /// Shutdown is observed before each cycle, during every wait and while a
    /// cycle is in flight. An abandoned cycle's history transaction rolls back.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            region = ?self.config.region,
            cadence_secs = self.config.cadence.as_secs(),
            backoff_secs = self.config.backoff.as_secs(),
            "Ingestion loop started"
        );
        self.status.set_state(LoopState::Running).await;

        while !shutdown.is_cancelled() {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown during ingestion cycle; abandoning it");
                    break;
                }
                outcome = self.run_guarded_cycle() => outcome,
            };

            let wait = match outcome {
                Ok(report) => {
                    info!(
                        fetched = report.fetched,
                        accepted = report.accepted,
                        rejected = report.rejected,
                        history = ?report.history,
                        cache = ?report.cache,
                        "Ingestion cycle complete"
                    );
                    self.status.record_success(&report).await;
                    self.config.cadence
                }
                Err(e) => {
                    match &e {
                        CycleError::Fetch(fetch) => {
                            warn!(error = %fetch, "Fetch failed; backing off")
                        }
                        CycleError::Unexpected(msg) => {
                            error!(error = %msg, "Unexpected failure in ingestion cycle; backing off")
                        }
                    }
                    self.status.record_failure(&e).await;
                    self.config.backoff
                }
            };

            if !sleep_or_cancel(wait, &shutdown).await {
                break;
            }
        }

        self.status.set_state(LoopState::Stopped).await;
        info!("Ingestion loop stopped");
    }

    /// [`run_cycle`](Self::run_cycle) behind a panic barrier
    ///
    /// A panic in any component becomes [`CycleError::Unexpected`] instead
    /// of killing the task.
    pub async fn run_guarded_cycle(&mut self) -> Result<CycleReport, CycleError> {
        match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(CycleError::Unexpected(panic_message(payload.as_ref()))),
        }
    }

    /// One fetch → filter → persist pass
    ///
    /// Only a fetch failure fails the cycle. Sink failures are logged and
    /// reported in the returned [`CycleReport`].
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let raws = self
            .source
            .fetch(&self.config.region, self.config.fetch_timeout)
            .await?;

        let outcome = filter::normalize_all(&raws, radar_common::time::now());
        let mut report = CycleReport::new(raws.len(), outcome.accepted.len(), outcome.rejected);

        if outcome.rejected > 0 {
            debug!(rejected = outcome.rejected, "Dropped state vectors without position");
        }
        if outcome.accepted.is_empty() {
            debug!(fetched = raws.len(), "No usable positions this cycle");
            return Ok(report);
        }

        report.history = match self.history.append_batch(&outcome.accepted).await {
            Ok(rows) => SinkOutcome::Written(rows),
            Err(e) => {
                warn!(error = %e, "History write failed; continuing with cache");
                SinkOutcome::Failed(e.to_string())
            }
        };

        report.cache = self.write_snapshot(&outcome.accepted).await;

        if matches!(report.history, SinkOutcome::Written(_)) {
            report.pruned = self.maybe_prune().await;
        }

        Ok(report)
    }

    /// Upsert then refresh the TTL, each bounded by the fetch timeout
    async fn write_snapshot(&self, positions: &[FlightPosition]) -> SinkOutcome {
        let entries: Vec<GeoEntry> = positions.iter().map(GeoEntry::from).collect();
        let limit = self.config.fetch_timeout;
        let ttl_secs = self.config.cache_ttl_secs;

        let result = match with_deadline(limit, self.cache.upsert_many(&entries)).await {
            Ok(()) => with_deadline(limit, self.cache.refresh_ttl(ttl_secs)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => SinkOutcome::Written(entries.len() as u64),
            Err(e) => {
                warn!(error = %e, "Snapshot cache write failed");
                SinkOutcome::Failed(e.to_string())
            }
        }
    }

    /// Apply retention at most once per prune interval
    async fn maybe_prune(&mut self) -> Option<u64> {
        let retention = self.config.retention?;
        if let Some(last) = self.last_prune {
            if last.elapsed() < self.config.prune_interval {
                return None;
            }
        }

        self.last_prune = Some(Instant::now());
        match self.history.prune_older_than(retention).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, retention_secs = retention.as_secs(), "Pruned history");
                }
                Some(removed)
            }
            Err(e) => {
                warn!(error = %e, "History prune failed");
                None
            }
        }
    }
}

/// A cache call that has not answered by `limit` counts as unavailable
async fn with_deadline<F>(limit: Duration, call: F) -> Result<(), CacheError>
where
    F: Future<Output = Result<(), CacheError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Unavailable(format!(
            "no reply within {}s",
            limit.as_secs_f64()
        ))),
    }
}

/// Wait for `duration`; false if cancelled first
async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_from_str_and_string() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(boxed.as_ref()), "panic with non-string payload");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_returns_false_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!sleep_or_cancel(Duration::from_secs(3600), &token).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_turns_hang_into_unavailable() {
        let start = Instant::now();
        let result = with_deadline(Duration::from_secs(10), std::future::pending()).await;

        assert!(matches!(result, Err(CacheError::Unavailable(_))));
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_with_deadline_passes_through_result() {
        let ok = with_deadline(Duration::from_secs(10), async { Ok(()) }).await;
        assert!(ok.is_ok());

        let failed = with_deadline(Duration::from_secs(10), async {
            Err(CacheError::Unavailable("refused".to_string()))
        })
        .await;
        assert!(matches!(failed, Err(CacheError::Unavailable(msg)) if msg == "refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_completes_sleep() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(sleep_or_cancel(Duration::from_secs(30), &token).await);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
