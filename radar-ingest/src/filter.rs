//! Record filter: raw state vector → canonical [`FlightPosition`]
//!
//! Pure functions, no I/O. Only the entity id and both coordinates are
//! mandatory; every other field falls back to a default.

use chrono::{DateTime, Utc};
use radar_common::time::truncate_to_millis;
use radar_common::{FlightPosition, LABEL_SENTINEL};

use crate::source::RawStateVector;

/// Result of normalizing one cycle's batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub accepted: Vec<FlightPosition>,
    pub rejected: usize,
}

/// Normalize one raw vector, or reject it
///
/// Rejects when the entity id is missing/blank or either coordinate is
/// missing. `now` becomes `observed_at` (millisecond precision), so the same
/// input and timestamp always give the same output.
pub fn normalize(raw: &RawStateVector, now: DateTime<Utc>) -> Option<FlightPosition> {
    let entity_id = raw.entity_id().map(str::trim).filter(|id| !id.is_empty())?;
    let longitude = raw.longitude().filter(|v| v.is_finite())?;
    let latitude = raw.latitude().filter(|v| v.is_finite())?;

    let label = raw
        .label()
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .unwrap_or(LABEL_SENTINEL);

    Some(FlightPosition {
        entity_id: entity_id.to_string(),
        label: label.to_string(),
        longitude,
        latitude,
        altitude: raw.altitude().unwrap_or(0.0),
        velocity: raw.velocity().unwrap_or(0.0),
        observed_at: truncate_to_millis(now),
    })
}

/// Normalize a whole batch with one shared timestamp
pub fn normalize_all(raws: &[RawStateVector], now: DateTime<Utc>) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    for raw in raws {
        match normalize(raw, now) {
            Some(position) => outcome.accepted.push(position),
            None => outcome.rejected += 1,
        }
    }
    outcome
}
