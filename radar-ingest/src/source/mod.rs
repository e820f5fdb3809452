//! Upstream state vector source
//!
//! The [`SourceClient`] trait abstracts over the tracking API so the
//! ingestion loop can be driven by a test double. [`OpenSkyClient`] is the
//! live implementation.
//!
//! Raw vectors are kept array-like: every source row is projected through a
//! [`FieldLayout`] into the compact six-slot order
//! `[entity_id, label, longitude, latitude, altitude, velocity]`. Nothing is
//! validated here; that is the record filter's job.

mod error;
mod opensky;

pub use error::FetchError;
pub use opensky::{OpenSkyClient, SourceConfig};

use async_trait::async_trait;
use radar_common::BoundingBox;
use serde_json::Value;
use std::time::Duration;

/// Trait for fetching raw state vectors for a region
///
/// Implementations must not retry internally; retry policy belongs to the
/// ingestion loop.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch all state vectors inside `region`, giving up after `timeout`
    async fn fetch(
        &self,
        region: &BoundingBox,
        timeout: Duration,
    ) -> Result<Vec<RawStateVector>, FetchError>;
}

/// Positions of the six fields of interest inside a source row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub entity_id: usize,
    pub label: usize,
    pub longitude: usize,
    pub latitude: usize,
    pub altitude: usize,
    pub velocity: usize,
}

impl FieldLayout {
    /// `[id, label, lon, lat, alt, vel]`
    pub const COMPACT: FieldLayout = FieldLayout {
        entity_id: 0,
        label: 1,
        longitude: 2,
        latitude: 3,
        altitude: 4,
        velocity: 5,
    };

    /// OpenSky `/states/all` rows: icao24, callsign, .., longitude (5),
    /// latitude (6), baro_altitude (7), .., velocity (9)
    pub const OPENSKY: FieldLayout = FieldLayout {
        entity_id: 0,
        label: 1,
        longitude: 5,
        latitude: 6,
        altitude: 7,
        velocity: 9,
    };

    /// Reorder a source row into the compact layout
    ///
    /// Indices past the end of the row become `null`.
    pub fn project(&self, row: &[Value]) -> RawStateVector {
        let pick = |idx: usize| row.get(idx).cloned().unwrap_or(Value::Null);
        RawStateVector(vec![
            pick(self.entity_id),
            pick(self.label),
            pick(self.longitude),
            pick(self.latitude),
            pick(self.altitude),
            pick(self.velocity),
        ])
    }
}

/// One aircraft row as delivered by the source, in compact order
///
/// May be malformed: any slot can be missing, `null` or of the wrong type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawStateVector(Vec<Value>);

impl RawStateVector {
    fn slot(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx).filter(|v| !v.is_null())
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.slot(0).and_then(Value::as_str)
    }

    pub fn label(&self) -> Option<&str> {
        self.slot(1).and_then(Value::as_str)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.slot(2).and_then(Value::as_f64)
    }

    pub fn latitude(&self) -> Option<f64> {
        self.slot(3).and_then(Value::as_f64)
    }

    pub fn altitude(&self) -> Option<f64> {
        self.slot(4).and_then(Value::as_f64)
    }

    pub fn velocity(&self) -> Option<f64> {
        self.slot(5).and_then(Value::as_f64)
    }
}

impl From<Vec<Value>> for RawStateVector {
    fn from(fields: Vec<Value>) -> Self {
        RawStateVector(fields)
    }
}

impl From<Value> for RawStateVector {
    /// A JSON array in compact order; anything else is an all-null vector
    fn from(value: Value) -> Self {
        match value {
            Value::Array(fields) => RawStateVector(fields),
            _ => RawStateVector::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compact_accessors() {
        let raw = RawStateVector::from(json!(["ABC123", "AI101 ", 77.5, 28.6, 9000, 230]));
        assert_eq!(raw.entity_id(), Some("ABC123"));
        assert_eq!(raw.label(), Some("AI101 "));
        assert_eq!(raw.longitude(), Some(77.5));
        assert_eq!(raw.latitude(), Some(28.6));
        // Integer JSON numbers read as floats
        assert_eq!(raw.altitude(), Some(9000.0));
        assert_eq!(raw.velocity(), Some(230.0));
    }

    #[test]
    fn test_wrong_types_read_as_absent() {
        let raw = RawStateVector::from(json!([42, false, "77.5", null, {}, []]));
        assert_eq!(raw.entity_id(), None);
        assert_eq!(raw.label(), None);
        assert_eq!(raw.longitude(), None);
        assert_eq!(raw.latitude(), None);
        assert_eq!(raw.altitude(), None);
        assert_eq!(raw.velocity(), None);
    }

    #[test]
    fn test_non_array_value_is_all_null() {
        let raw = RawStateVector::from(json!({"icao24": "abc"}));
        assert_eq!(raw, RawStateVector::default());
        assert_eq!(raw.entity_id(), None);
    }

    #[test]
    fn test_opensky_layout_projection() {
        // icao24, callsign, origin_country, time_position, last_contact,
        // longitude, latitude, baro_altitude, on_ground, velocity, ...
        let row = json!([
            "800c1b", "IGO6047 ", "India", 1700000000, 1700000001,
            77.1, 28.5, 10668.0, false, 231.5, 87.0, 0.0, null, 10972.8, "2000", false, 0
        ]);
        let raw = FieldLayout::OPENSKY.project(row.as_array().unwrap());

        assert_eq!(raw.entity_id(), Some("800c1b"));
        assert_eq!(raw.label(), Some("IGO6047 "));
        assert_eq!(raw.longitude(), Some(77.1));
        assert_eq!(raw.latitude(), Some(28.5));
        assert_eq!(raw.altitude(), Some(10668.0));
        assert_eq!(raw.velocity(), Some(231.5));
    }

    #[test]
    fn test_short_row_projects_missing_as_null() {
        let row = json!(["800c1b", "IGO6047"]);
        let raw = FieldLayout::OPENSKY.project(row.as_array().unwrap());
        assert_eq!(raw.entity_id(), Some("800c1b"));
        assert_eq!(raw.longitude(), None);
        assert_eq!(raw.velocity(), None);
    }
}
