//! Database initialization
//!
//! Creates the database on first run and the `live_flights` history table.
//! Safe to call on every startup: all statements are idempotent.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// SQLite busy timeout for writer/reader contention
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initialize database connection from a connection string and create tables if needed
///
/// Accepts any sqlx SQLite URL (`sqlite://path?mode=rwc`, `sqlite::memory:`).
/// In-memory databases are pinned to a single never-recycled connection,
/// otherwise every pooled connection would see its own empty database.
pub async fn init_database(db_url: &str) -> Result<SqlitePool> {
    let in_memory = is_memory_url(db_url);

    let mut options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        // WAL lets the reader API query while the loop commits
        options = options.journal_mode(SqliteJournalMode::Wal);
        SqlitePoolOptions::new().max_connections(8)
    };

    debug!("Connecting to database: {}", db_url);
    let pool = pool_options.connect_with(options).await?;

    create_live_flights_table(&pool).await?;

    info!(in_memory, "History database ready");
    Ok(pool)
}

/// Initialize an on-disk database, creating its parent directory first
pub async fn init_database_file(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = init_database(&database_url(db_path)).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    Ok(pool)
}

/// SQLite URL (read, write, create) for a file path
pub fn database_url(db_path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", db_path.display())
}

fn is_memory_url(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

/// Append-only history table
///
/// No primary key across cycles: the same aircraft appears once per cycle.
/// `processed_at` is Unix milliseconds so window filters compare integers.
async fn create_live_flights_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS live_flights (
            icao24 TEXT NOT NULL CHECK (length(icao24) > 0),
            callsign TEXT NOT NULL,
            longitude REAL NOT NULL,
            latitude REAL NOT NULL,
            altitude REAL NOT NULL DEFAULT 0.0,
            velocity REAL NOT NULL DEFAULT 0.0,
            processed_at INTEGER NOT NULL
                DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_live_flights_entity_time \
         ON live_flights (icao24, processed_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_live_flights_time ON live_flights (processed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
