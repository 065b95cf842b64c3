#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Case, district, and detection result types.
//!
//! These types are shared by every stage of the outbreak detection
//! toolchain: ingestion produces [`CaseEvent`]s and [`District`]s, the
//! aggregator turns them into [`DistrictPeriod`] and [`StatePeriod`] rows,
//! and the detection engines emit the result types in [`results`].

pub mod calendar;
pub mod error;
pub mod progress;
pub mod results;

use serde::{Deserialize, Serialize};

pub use calendar::PeriodCalendar;
pub use error::{DetectionError, FailureKind, StepFailure};

/// A single reported case as ingested from the point-pattern dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseEvent {
    /// Case identifier, unique within the dataset.
    pub id: u64,
    /// Disease sub-type (e.g. `"B"` or `"C"`).
    #[serde(rename = "type")]
    pub case_type: String,
    /// Continuous day index relative to the calendar origin.
    pub time: f64,
    /// Projected x coordinate.
    pub x: f64,
    /// Projected y coordinate.
    pub y: f64,
    /// District tile identifier (first two characters are the state).
    pub tile_id: String,
}

/// A district in the reference grid with its static covariates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    /// District tile identifier.
    pub tile_id: String,
    /// Land area.
    pub area: f64,
    /// Resident population.
    pub population: f64,
    /// Centroid x coordinate.
    pub x: f64,
    /// Centroid y coordinate.
    pub y: f64,
}

impl District {
    /// Two-character state prefix of this district's tile ID.
    #[must_use]
    pub fn state_id(&self) -> Option<&str> {
        state_id(&self.tile_id)
    }
}

/// Derive the state ID from a tile ID (first 2 characters).
#[must_use]
pub fn state_id(tile_id: &str) -> Option<&str> {
    tile_id.get(..2)
}

/// The district/time reference grid: every district crossed with every
/// period in `first_period..=last_period`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceGrid {
    /// Districts in catalog order. Zone member indices refer to this order.
    pub districts: Vec<District>,
    /// First period index (1-based) covered by the grid.
    pub first_period: u32,
    /// Last period index covered by the grid (inclusive).
    pub last_period: u32,
}

impl ReferenceGrid {
    /// Position of a district by tile ID.
    #[must_use]
    pub fn district_index(&self, tile_id: &str) -> Option<usize> {
        self.districts.iter().position(|d| d.tile_id == tile_id)
    }

    /// Number of periods in the grid.
    #[must_use]
    pub const fn period_count(&self) -> usize {
        if self.last_period < self.first_period {
            0
        } else {
            (self.last_period - self.first_period + 1) as usize
        }
    }

    /// Whether `period` falls inside the grid.
    #[must_use]
    pub const fn contains_period(&self, period: u32) -> bool {
        period >= self.first_period && period <= self.last_period
    }
}

/// Case count for one district in one period, joined with its covariates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictPeriod {
    /// District tile identifier.
    pub tile_id: String,
    /// Period index (1-based month).
    pub period: u32,
    /// Land area (constant across periods).
    pub area: f64,
    /// Population (constant across periods).
    pub population: f64,
    /// Number of cases.
    pub count: u64,
}

/// Case count for one state in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePeriod {
    /// Two-character state prefix.
    pub state_id: String,
    /// Period index (1-based month).
    pub period: u32,
    /// Summed district area.
    pub area: f64,
    /// Summed district population.
    pub population: f64,
    /// Summed district counts.
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn district(tile_id: &str) -> District {
        District {
            tile_id: tile_id.to_string(),
            area: 1.0,
            population: 100.0,
            x: 0.0,
            y: 0.0,
        }
    }

    #[test]
    fn state_id_is_two_character_prefix() {
        assert_eq!(state_id("05123"), Some("05"));
        assert_eq!(district("11001").state_id(), Some("11"));
    }

    #[test]
    fn state_id_rejects_short_tiles() {
        assert_eq!(state_id("7"), None);
        assert_eq!(state_id(""), None);
    }

    #[test]
    fn grid_period_helpers() {
        let grid = ReferenceGrid {
            districts: vec![district("01001"), district("01002")],
            first_period: 3,
            last_period: 8,
        };
        assert_eq!(grid.period_count(), 6);
        assert!(grid.contains_period(3));
        assert!(grid.contains_period(8));
        assert!(!grid.contains_period(9));
        assert_eq!(grid.district_index("01002"), Some(1));
        assert_eq!(grid.district_index("99999"), None);
    }

    #[test]
    fn case_event_uses_type_column() {
        let json = r#"{"id":7,"type":"B","time":12.5,"x":1.0,"y":2.0,"tile_id":"0101"}"#;
        let event: CaseEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.case_type, "B");
        assert_eq!(event.tile_id, "0101");
    }
}
