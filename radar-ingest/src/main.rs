//! radar-ingest - Live aircraft position ingestion service
//!
//! Polls the tracking API for one region, keeps a geo-indexed snapshot in
//! the cache and appends every cycle to the history store. Serves health
//! and read endpoints over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use radar_common::config::TomlConfig;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radar_ingest::cache;
use radar_ingest::config::{Args, IngestConfig};
use radar_ingest::history::SqliteHistoryStore;
use radar_ingest::ingest::{IngestionLoop, IngestionSupervisor, StatusHandle};
use radar_ingest::source::OpenSkyClient;
use radar_ingest::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging starts so the file can set the level
    let toml_config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration file")?;
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| toml_config.logging.level.clone());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "radar-ingest (Live Radar Ingestion) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = IngestConfig::resolve(&args, &toml_config).context("Invalid configuration")?;
    info!(
        region = %config.region_name,
        bbox = ?config.region,
        source = %config.source.base_url,
        "Configuration resolved"
    );

    let pool = radar_common::db::init_database(&config.store_url)
        .await
        .context("Failed to open history store")?;
    let history = Arc::new(SqliteHistoryStore::new(pool.clone()));

    let snapshot_cache = cache::connect(&config.cache_url, &config.index_name())
        .context("Failed to configure snapshot cache")?;

    let source = Arc::new(
        OpenSkyClient::new(&config.source).context("Failed to build tracking API client")?,
    );
    info!("Polling {}", source.states_url());

    let status = StatusHandle::new();
    let ingestion = IngestionLoop::new(
        source,
        history.clone(),
        snapshot_cache.clone(),
        config.loop_config(),
        status.clone(),
    );

    let supervisor = IngestionSupervisor::new();
    supervisor
        .start(ingestion)
        .await
        .context("Failed to start ingestion loop")?;

    let app = build_router(AppState::new(history, snapshot_cache, status));

    info!("Listening on http://{}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .context("Failed to bind to address")?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    if let Err(e) = supervisor.shutdown().await {
        warn!("Ingestion loop did not stop cleanly: {}", e);
    }
    pool.close().await;

    served?;
    info!("Shutdown complete");
    Ok(())
}

/// Filter used when RUST_LOG is unset
///
/// A bare level applies to this service's crates only; anything else is
/// taken as a full filter directive.
fn default_filter(level: &str) -> String {
    match level {
        "trace" | "debug" | "info" | "warn" | "error" => format!(
            "radar_ingest={level},radar_common={level},tower_http={level}",
            level = level
        ),
        directive => directive.to_string(),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
