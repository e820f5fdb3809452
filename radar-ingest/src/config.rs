//! Configuration resolution for radar-ingest
//!
//! Priority: command line → environment (both via clap) → TOML file →
//! built-in default. Connection strings and the region have no default.

use clap::Parser;
use radar_common::config::{
    TomlConfig, DEFAULT_BACKOFF_SECS, DEFAULT_CACHE_TTL_SECS, DEFAULT_CADENCE_SECS,
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_HTTP_BIND, DEFAULT_PRUNE_INTERVAL_SECS,
    DEFAULT_RETENTION_SECS, DEFAULT_SOURCE_URL,
};
use radar_common::{BoundingBox, Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::ingest::LoopConfig;
use crate::source::SourceConfig;

/// Region name used when only a bounding box is given
pub const DEFAULT_REGION_NAME: &str = "region";

/// Upper bound on the snapshot TTL (one year)
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 86_400;

/// Command-line arguments for radar-ingest
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "radar-ingest")]
#[command(about = "Live aircraft position ingestion service")]
#[command(version)]
pub struct Args {
    /// TOML config file (default: <config dir>/radar/radar-ingest.toml)
    #[arg(short, long, env = "RADAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Tracking API root URL
    #[arg(long, env = "RADAR_SOURCE_URL")]
    pub source_url: Option<String>,

    /// Upstream request timeout in seconds
    #[arg(long, env = "RADAR_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,

    /// Tracking API account name
    #[arg(long, env = "RADAR_SOURCE_USERNAME")]
    pub source_username: Option<String>,

    /// Tracking API account password
    #[arg(long, env = "RADAR_SOURCE_PASSWORD", hide_env_values = true)]
    pub source_password: Option<String>,

    /// Region name, also the cache index prefix
    #[arg(long, env = "RADAR_REGION")]
    pub region: Option<String>,

    /// Bounding box as "lamin,lomin,lamax,lomax"
    #[arg(long, env = "RADAR_BBOX", allow_hyphen_values = true)]
    pub bbox: Option<String>,

    /// Snapshot cache URL (redis://host:port/db or memory://)
    #[arg(long, env = "RADAR_CACHE_URL")]
    pub cache_url: Option<String>,

    /// Snapshot index TTL in seconds
    #[arg(long, env = "RADAR_CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,

    /// History store URL (sqlite://path?mode=rwc or sqlite::memory:)
    #[arg(long, env = "RADAR_STORE_URL")]
    pub store_url: Option<String>,

    /// History retention in seconds (0 keeps everything)
    #[arg(long, env = "RADAR_RETENTION_SECS")]
    pub retention_secs: Option<u64>,

    /// Minimum seconds between history prunes
    #[arg(long, env = "RADAR_PRUNE_INTERVAL_SECS")]
    pub prune_interval_secs: Option<u64>,

    /// Seconds between successful cycles
    #[arg(long, env = "RADAR_CADENCE_SECS")]
    pub cadence_secs: Option<u64>,

    /// Seconds to wait after a failed cycle
    #[arg(long, env = "RADAR_BACKOFF_SECS")]
    pub backoff_secs: Option<u64>,

    /// HTTP listen address for health and read API
    #[arg(short, long, env = "RADAR_HTTP_BIND")]
    pub bind: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "RADAR_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Fully resolved and validated service configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub source: SourceConfig,
    pub region_name: String,
    pub region: BoundingBox,
    pub cache_url: String,
    pub cache_ttl_secs: u64,
    pub store_url: String,
    /// `None` disables pruning
    pub retention: Option<Duration>,
    pub prune_interval: Duration,
    pub cadence: Duration,
    pub backoff: Duration,
    pub bind: SocketAddr,
    pub log_level: String,
}

impl IngestConfig {
    /// Merge CLI/ENV arguments over the TOML file and validate
    pub fn resolve(args: &Args, toml: &TomlConfig) -> Result<Self> {
        let source = SourceConfig {
            base_url: pick(&args.source_url, &toml.source.base_url)
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            timeout: Duration::from_secs(
                pick(&args.fetch_timeout_secs, &toml.source.timeout_secs)
                    .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            ),
            username: pick(&args.source_username, &toml.source.username),
            password: pick(&args.source_password, &toml.source.password),
        };

        let region = match &args.bbox {
            Some(raw) => parse_bbox(raw)?,
            None => match &toml.region {
                Some(section) => {
                    BoundingBox::new(section.lamin, section.lomin, section.lamax, section.lomax)?
                }
                None => {
                    return Err(Error::Config(
                        "region not configured: pass --bbox lamin,lomin,lamax,lomax, set \
                         RADAR_BBOX, or add a [region] section to the config file"
                            .to_string(),
                    ))
                }
            },
        };

        let region_name = args
            .region
            .clone()
            .or_else(|| toml.region.as_ref().map(|r| r.name.clone()))
            .unwrap_or_else(|| DEFAULT_REGION_NAME.to_string());
        if region_name.trim().is_empty() {
            return Err(Error::Config("region name must not be empty".to_string()));
        }

        let cache_url = pick(&args.cache_url, &toml.cache.url).ok_or_else(|| {
            Error::Config(
                "cache URL not configured: pass --cache-url, set RADAR_CACHE_URL, or add \
                 [cache] url to the config file (memory:// for an in-process cache)"
                    .to_string(),
            )
        })?;

        let store_url = pick(&args.store_url, &toml.store.url).ok_or_else(|| {
            Error::Config(
                "store URL not configured: pass --store-url, set RADAR_STORE_URL, or add \
                 [store] url to the config file"
                    .to_string(),
            )
        })?;

        let retention_secs = pick(&args.retention_secs, &toml.store.retention_secs)
            .unwrap_or(DEFAULT_RETENTION_SECS);

        let bind_raw = pick(&args.bind, &toml.http.bind).unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("invalid bind address '{}': {}", bind_raw, e)))?;

        let config = Self {
            source,
            region_name,
            region,
            cache_url,
            cache_ttl_secs: pick(&args.cache_ttl_secs, &toml.cache.ttl_secs)
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
            store_url,
            retention: (retention_secs > 0).then(|| Duration::from_secs(retention_secs)),
            prune_interval: Duration::from_secs(
                pick(&args.prune_interval_secs, &toml.store.prune_interval_secs)
                    .unwrap_or(DEFAULT_PRUNE_INTERVAL_SECS),
            ),
            cadence: Duration::from_secs(
                pick(&args.cadence_secs, &toml.ingest.cadence_secs).unwrap_or(DEFAULT_CADENCE_SECS),
            ),
            backoff: Duration::from_secs(
                pick(&args.backoff_secs, &toml.ingest.backoff_secs).unwrap_or(DEFAULT_BACKOFF_SECS),
            ),
            bind,
            log_level: args
                .log_level
                .clone()
                .unwrap_or_else(|| toml.logging.level.clone()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cadence.is_zero() {
            return Err(Error::Config("cadence must be at least 1 second".to_string()));
        }
        if self.source.timeout.is_zero() {
            return Err(Error::Config("fetch timeout must be at least 1 second".to_string()));
        }
        let min_backoff = self
            .cadence
            .checked_mul(2)
            .ok_or_else(|| Error::Config("cadence is too large".to_string()))?;
        if self.backoff < min_backoff {
            return Err(Error::Config(format!(
                "backoff ({}s) must be at least twice the cadence ({}s)",
                self.backoff.as_secs(),
                self.cadence.as_secs()
            )));
        }
        if self.cache_ttl_secs == 0 || self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(Error::Config(format!(
                "cache TTL must be between 1 and {} seconds, got {}",
                MAX_CACHE_TTL_SECS, self.cache_ttl_secs
            )));
        }
        let ttl_floor = self.cadence.checked_mul(4).unwrap_or(Duration::MAX);
        if Duration::from_secs(self.cache_ttl_secs) < ttl_floor {
            warn!(
                ttl_secs = self.cache_ttl_secs,
                cadence_secs = self.cadence.as_secs(),
                "Cache TTL is shorter than 4x the cadence; the snapshot may lapse between cycles"
            );
        }
        Ok(())
    }

    /// Cache index key for this region
    pub fn index_name(&self) -> String {
        format!("{}_flights", self.region_name)
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            region: self.region,
            fetch_timeout: self.source.timeout,
            cadence: self.cadence,
            backoff: self.backoff,
            cache_ttl_secs: self.cache_ttl_secs,
            retention: self.retention,
            prune_interval: self.prune_interval,
        }
    }
}

/// First value present: CLI/ENV, then TOML
fn pick<T: Clone>(cli: &Option<T>, toml: &Option<T>) -> Option<T> {
    cli.clone().or_else(|| toml.clone())
}

/// Parse "lamin,lomin,lamax,lomax"
pub fn parse_bbox(raw: &str) -> Result<BoundingBox> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Config(format!("invalid bounding box '{}': {}", raw, e)))?;

    match parts.as_slice() {
        [lamin, lomin, lamax, lomax] => BoundingBox::new(*lamin, *lomin, *lamax, *lomax),
        _ => Err(Error::Config(format!(
            "bounding box needs 4 comma-separated values (lamin,lomin,lamax,lomax), got '{}'",
            raw
        ))),
    }
}
