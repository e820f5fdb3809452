//! Flight history queries
//!
//! The reader contract exposed to presentation layers is
//! [`latest_per_entity`]: the most recent row per aircraft observed within a
//! window, ordered by aircraft id. Writers use [`insert_position`] inside
//! their own transaction.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::time::Duration;

use crate::models::FlightPosition;
use crate::time::{from_unix_millis, to_unix_millis};
use crate::Result;

/// Default reader window (5 minutes)
pub const LATEST_WINDOW: Duration = Duration::from_secs(300);

type FlightRow = (String, String, f64, f64, f64, f64, i64);

fn row_to_position(row: FlightRow) -> FlightPosition {
    let (entity_id, label, longitude, latitude, altitude, velocity, processed_at) = row;
    FlightPosition {
        entity_id,
        label,
        longitude,
        latitude,
        altitude,
        velocity,
        observed_at: from_unix_millis(processed_at),
    }
}

/// Insert one history row
///
/// Takes a connection rather than the pool so callers can batch inside a
/// transaction (`&mut *tx`).
pub async fn insert_position(
    conn: &mut SqliteConnection,
    position: &FlightPosition,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO live_flights (
            icao24, callsign, longitude, latitude, altitude, velocity, processed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&position.entity_id)
    .bind(&position.label)
    .bind(position.longitude)
    .bind(position.latitude)
    .bind(position.altitude)
    .bind(position.velocity)
    .bind(to_unix_millis(position.observed_at))
    .execute(conn)
    .await?;

    Ok(())
}

/// Latest row per aircraft within `window` of the current time
pub async fn latest_per_entity(pool: &SqlitePool, window: Duration) -> Result<Vec<FlightPosition>> {
    latest_per_entity_at(pool, window, crate::time::now()).await
}

/// Latest row per aircraft within `window` of `now`
///
/// Rows strictly newer than `now - window` qualify. Ties on `processed_at`
/// resolve to the row inserted last.
pub async fn latest_per_entity_at(
    pool: &SqlitePool,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<FlightPosition>> {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    let cutoff = to_unix_millis(now).saturating_sub(window_ms);

    let rows = sqlx::query_as::<_, FlightRow>(
        r#"
        SELECT icao24, callsign, longitude, latitude, altitude, velocity, processed_at
        FROM (
            SELECT icao24, callsign, longitude, latitude, altitude, velocity, processed_at,
                   ROW_NUMBER() OVER (
                       PARTITION BY icao24
                       ORDER BY processed_at DESC, rowid DESC
                   ) AS recency
            FROM live_flights
            WHERE processed_at > ?
        )
        WHERE recency = 1
        ORDER BY icao24
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_position).collect())
}

/// Delete rows observed before `cutoff`, returning how many were removed
pub async fn prune_before(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM live_flights WHERE processed_at < ?")
        .bind(to_unix_millis(cutoff))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Total number of history rows
pub async fn count_rows(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM live_flights")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
