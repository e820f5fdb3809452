//! Error types for the upstream source client

use std::time::Duration;
use thiserror::Error;

/// Recoverable upstream failures; both trigger the loop's error backoff
///
/// A malformed payload is not an error: it yields an empty batch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request did not complete within the timeout
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success status or transport failure
    #[error("Upstream source unavailable{}: {message}", status_suffix(.status))]
    SourceUnavailable {
        status: Option<u16>,
        message: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl FetchError {
    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        FetchError::SourceUnavailable {
            status: None,
            message: message.into(),
        }
    }
}
