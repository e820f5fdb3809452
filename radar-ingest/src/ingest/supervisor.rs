//! Ownership of the background ingestion task

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::IngestionLoop;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Ingestion loop is already running")]
    AlreadyRunning,

    #[error("Ingestion task failed: {0}")]
    TaskFailed(String),
}

struct RunningTask {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Starts and stops the one ingestion task of this process
///
/// The guard lives in the supervisor, so two supervisors can each run a loop
/// (tests do this); the binary creates exactly one.
#[derive(Default)]
pub struct IngestionSupervisor {
    task: Mutex<Option<RunningTask>>,
}

impl IngestionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the loop, unless one is already running
    pub async fn start(&self, ingestion: IngestionLoop) -> Result<(), SupervisorError> {
        let mut slot = self.task.lock().await;
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                warn!("Refusing to start a second ingestion loop");
                return Err(SupervisorError::AlreadyRunning);
            }
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(ingestion.run(shutdown.clone()));
        *slot = Some(RunningTask { shutdown, handle });

        info!("Ingestion task spawned");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map_or(false, |task| !task.handle.is_finished())
    }

    /// Cancel the loop and wait for it to finish
    ///
    /// No-op when nothing is running. Afterwards `start` may be called again.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };

        info!("Stopping ingestion task");
        task.shutdown.cancel();
        task.handle
            .await
            .map_err(|e| SupervisorError::TaskFailed(e.to_string()))?;
        info!("Ingestion task stopped");
        Ok(())
    }
}
