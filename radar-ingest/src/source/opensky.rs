//! OpenSky Network REST client
//!
//! Fetches `/states/all` for a bounding box via `reqwest`. The upstream
//! enforces a shared rate-limit quota, so this client never retries; the
//! ingestion loop decides when to call again.

use async_trait::async_trait;
use radar_common::BoundingBox;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use super::{FetchError, FieldLayout, RawStateVector, SourceClient};

const USER_AGENT: &str = concat!("radar-ingest/", env!("CARGO_PKG_VERSION"));

/// Connection settings for the tracking API
#[derive(Clone)]
pub struct SourceConfig {
    /// API root, e.g. `https://opensky-network.org/api`
    pub base_url: String,
    /// Per-request timeout used when the caller does not override it
    pub timeout: Duration,
    /// Optional account credentials (registered users get a larger quota)
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Live client for the OpenSky `/states/all` endpoint
pub struct OpenSkyClient {
    http: reqwest::Client,
    states_url: String,
    credentials: Option<(String, Option<String>)>,
    layout: FieldLayout,
}

impl OpenSkyClient {
    /// Create a client with a reusable connection pool
    pub fn new(config: &SourceConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            states_url: format!("{}/states/all", config.base_url.trim_end_matches('/')),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
            layout: FieldLayout::OPENSKY,
        })
    }

    /// Full URL of the states endpoint
    pub fn states_url(&self) -> &str {
        &self.states_url
    }
}

#[async_trait]
impl SourceClient for OpenSkyClient {
    async fn fetch(
        &self,
        region: &BoundingBox,
        timeout: Duration,
    ) -> Result<Vec<RawStateVector>, FetchError> {
        let mut request = self
            .http
            .get(&self.states_url)
            .query(&region.query_params())
            .timeout(timeout);

        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let mut message = status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                message = format!("{} (rate limit quota exhausted)", message);
            }
            return Err(FetchError::SourceUnavailable {
                status: Some(status.as_u16()),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(e, timeout))?;

        let vectors = parse_states(&bytes, &self.layout);

        tracing::debug!(
            url = %self.states_url,
            vectors = vectors.len(),
            "Fetched state vectors"
        );

        Ok(vectors)
    }
}

fn classify_transport_error(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::unavailable(error.to_string())
    }
}

/// Extract the `states` array from a response body
///
/// Absence of data is not an error: a body that is not JSON, lacks the
/// `states` field, or carries `states: null` yields an empty batch.
pub(crate) fn parse_states(body: &[u8], layout: &FieldLayout) -> Vec<RawStateVector> {
    let document: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Source payload is not valid JSON; treating as empty");
            return Vec::new();
        }
    };

    match document.get("states") {
        Some(Value::Array(rows)) => rows
            .iter()
            .map(|row| match row {
                Value::Array(fields) => layout.project(fields),
                _ => RawStateVector::default(),
            })
            .collect(),
        Some(Value::Null) => {
            tracing::debug!("Source reported no aircraft in region");
            Vec::new()
        }
        Some(_) => {
            tracing::warn!("Source payload has non-array states field; treating as empty");
            Vec::new()
        }
        None => {
            tracing::warn!("Source payload missing states field; treating as empty");
            Vec::new()
        }
    }
}
