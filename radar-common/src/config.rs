//! TOML configuration file loading
//!
//! Resolution order used by the services:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in default (only where one is documented)
//!
//! This module owns tier 3. Every field is optional here so that a partial
//! file still parses; the service merges it with CLI/ENV values and then
//! validates the result.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default OpenSky REST endpoint
pub const DEFAULT_SOURCE_URL: &str = "https://opensky-network.org/api";
/// Upstream request timeout
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
/// Normal cadence between successful cycles
pub const DEFAULT_CADENCE_SECS: u64 = 30;
/// Wait after a failed fetch
pub const DEFAULT_BACKOFF_SECS: u64 = 60;
/// Snapshot index expiry
pub const DEFAULT_CACHE_TTL_SECS: u64 = 120;
/// Reader window for the latest-positions query
pub const DEFAULT_READ_WINDOW_SECS: u64 = 300;
/// History retention horizon
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;
/// Minimum spacing between history prunes
pub const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 15 * 60;
/// HTTP listen address
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:5780";

/// Name of the config file looked up in the user config directory
pub const CONFIG_FILE_NAME: &str = "radar-ingest.toml";

/// Bootstrap configuration loaded from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub region: Option<RegionSection>,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[source]`: upstream tracking API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSection {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `[region]`: polled bounding box and the cache index it feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSection {
    pub name: String,
    pub lamin: f64,
    pub lomin: f64,
    pub lamax: f64,
    pub lomax: f64,
}

/// `[cache]`: geo-indexed snapshot cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSection {
    pub url: Option<String>,
    pub ttl_secs: Option<u64>,
}

/// `[store]`: durable history store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    pub url: Option<String>,
    pub retention_secs: Option<u64>,
    pub prune_interval_secs: Option<u64>,
}

/// `[ingest]`: loop timing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSection {
    pub cadence_secs: Option<u64>,
    pub backoff_secs: Option<u64>,
}

/// `[http]`: health and read API listener
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpSection {
    pub bind: Option<String>,
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive (trace, debug, info, warn, error or a full EnvFilter string)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load a TOML file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the explicit file if given, else the default location if present
    ///
    /// A missing default file is not an error: CLI and ENV may supply
    /// everything. An explicit path that cannot be read is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                warn!(
                    "No config file at {}; relying on command line and environment",
                    path.display()
                );
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }
}

/// Platform config location: `<config_dir>/radar/radar-ingest.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("radar").join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_parses_to_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert!(config.region.is_none());
        assert!(config.cache.url.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_region_section_requires_all_corners() {
        let result = TomlConfig::from_toml_str(
            r#"
            [region]
            name = "india"
            lamin = 6.55
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("this is = = not toml");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
