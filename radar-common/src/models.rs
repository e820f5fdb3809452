//! Canonical data model shared by the ingest service and readers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Label stored when the source reports no callsign
pub const LABEL_SENTINEL: &str = "NONE";

/// Validated, normalized aircraft position
///
/// Created once per ingestion cycle per accepted state vector and never
/// mutated afterwards. A newer record (later `observed_at`) supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPosition {
    /// ICAO24-style hex identifier, never empty
    pub entity_id: String,
    /// Trimmed callsign, or [`LABEL_SENTINEL`]
    pub label: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Barometric altitude in meters (0.0 when unreported)
    pub altitude: f64,
    /// Ground speed in m/s (0.0 when unreported)
    pub velocity: f64,
    /// Ingestion time, not source time
    pub observed_at: DateTime<Utc>,
}

/// Geographic bounding box in degrees
///
/// Field names follow the tracking API's query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lamin: f64,
    pub lomin: f64,
    pub lamax: f64,
    pub lomax: f64,
}

impl BoundingBox {
    /// Create a validated bounding box
    pub fn new(lamin: f64, lomin: f64, lamax: f64, lomax: f64) -> Result<Self> {
        let bbox = Self {
            lamin,
            lomin,
            lamax,
            lomax,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check ranges and ordering of the corners
    pub fn validate(&self) -> Result<()> {
        let finite = [self.lamin, self.lomin, self.lamax, self.lomax]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(Error::InvalidInput(format!(
                "bounding box has non-finite corner: {:?}",
                self
            )));
        }
        if !(-90.0..=90.0).contains(&self.lamin) || !(-90.0..=90.0).contains(&self.lamax) {
            return Err(Error::InvalidInput(format!(
                "latitude out of range [-90, 90]: {} .. {}",
                self.lamin, self.lamax
            )));
        }
        if !(-180.0..=180.0).contains(&self.lomin) || !(-180.0..=180.0).contains(&self.lomax) {
            return Err(Error::InvalidInput(format!(
                "longitude out of range [-180, 180]: {} .. {}",
                self.lomin, self.lomax
            )));
        }
        if self.lamin >= self.lamax || self.lomin >= self.lomax {
            return Err(Error::InvalidInput(format!(
                "bounding box min must be below max: lat {} .. {}, lon {} .. {}",
                self.lamin, self.lamax, self.lomin, self.lomax
            )));
        }
        Ok(())
    }

    /// Whether a point lies inside the box (edges inclusive)
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        (self.lamin..=self.lamax).contains(&latitude)
            && (self.lomin..=self.lomax).contains(&longitude)
    }

    /// Center point as (longitude, latitude)
    pub fn center(&self) -> (f64, f64) {
        (
            (self.lomin + self.lomax) / 2.0,
            (self.lamin + self.lamax) / 2.0,
        )
    }

    /// Query parameters in the order the tracking API documents them
    pub fn query_params(&self) -> [(&'static str, f64); 4] {
        [
            ("lamin", self.lamin),
            ("lomin", self.lomin),
            ("lamax", self.lamax),
            ("lomax", self.lomax),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn india() -> BoundingBox {
        BoundingBox::new(6.55, 68.11, 35.67, 97.40).unwrap()
    }

    #[test]
    fn test_bbox_accepts_valid_region() {
        let bbox = india();
        assert_eq!(bbox.lamin, 6.55);
        assert_eq!(bbox.lomax, 97.40);
    }

    #[test]
    fn test_bbox_rejects_inverted_corners() {
        let result = BoundingBox::new(35.0, 68.0, 6.0, 97.0);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_bbox_rejects_out_of_range_latitude() {
        assert!(BoundingBox::new(-91.0, 0.0, 10.0, 10.0).is_err());
        assert!(BoundingBox::new(0.0, 0.0, 10.0, 181.0).is_err());
    }

    #[test]
    fn test_bbox_rejects_nan() {
        assert!(BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0).is_err());
    }

    #[test]
    fn test_bbox_contains_edges() {
        let bbox = india();
        assert!(bbox.contains(77.5, 28.6));
        assert!(bbox.contains(68.11, 6.55));
        assert!(!bbox.contains(100.0, 28.6));
        assert!(!bbox.contains(77.5, 40.0));
    }

    #[test]
    fn test_bbox_center() {
        let bbox = BoundingBox::new(-10.0, -20.0, 10.0, 30.0).unwrap();
        assert_eq!(bbox.center(), (5.0, 0.0));
    }

    #[test]
    fn test_query_params_order() {
        let names: Vec<&str> = india().query_params().iter().map(|(k, _)| *k).collect();
        assert_eq!(names, vec!["lamin", "lomin", "lamax", "lomax"]);
    }

    #[test]
    fn test_flight_position_serializes_snake_case() {
        let position = FlightPosition {
            entity_id: "abc123".to_string(),
            label: "AI101".to_string(),
            longitude: 77.5,
            latitude: 28.6,
            altitude: 9000.0,
            velocity: 230.0,
            observed_at: crate::time::from_unix_millis(1_700_000_000_000),
        };
        let json = serde_json::to_value(&position).unwrap();
        assert_eq!(json["entity_id"], "abc123");
        assert_eq!(json["label"], "AI101");
        assert_eq!(json["altitude"], 9000.0);
    }
}
