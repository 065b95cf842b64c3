#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input loading for the outbreak detection toolchain.
//!
//! Reads the case point pattern, the district reference grid (CSV or
//! `GeoJSON`), an optional zone catalog file, and the TOML run
//! configuration. [`load_dataset`] ties them together into the reference
//! grid the aggregator and engines work on.

pub mod cases;
pub mod config;
pub mod districts;
pub mod zones;

use std::path::Path;

use outbreak_models::{CaseEvent, DetectionError, PeriodCalendar, ReferenceGrid};
use outbreak_zones::ZoneCatalog;

pub use cases::{load_cases, read_cases};
pub use config::{AnalysisConfig, DataConfig, OutputConfig, load_config, parse_config_toml};
pub use districts::{load_districts, parse_districts_geojson, read_districts_csv};
pub use zones::{load_zone_catalog, read_zone_catalog};

/// Errors raised while reading input files or configuration.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// I/O error opening or reading a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV parsing error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Malformed TOML configuration.
    #[error("TOML error in {path}: {message}")]
    Toml {
        /// Path to the configuration file.
        path: String,
        /// Parser message.
        message: String,
    },

    /// Malformed or unsupported `GeoJSON`.
    #[error("GeoJSON error in {path}: {message}")]
    GeoJson {
        /// Path to the `GeoJSON` file.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// Well-formed input whose contents are unusable.
    #[error("Invalid input in {path}: {message}")]
    Invalid {
        /// Path to the offending file.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// Input rejected by a detection-layer check.
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

/// Opens a file, mapping failures to [`IngestError::Io`].
pub(crate) fn open(path: &Path) -> Result<std::fs::File, IngestError> {
    std::fs::File::open(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Case events and the reference grid they are counted against.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Every case event in the input, in file order.
    pub events: Vec<CaseEvent>,
    /// Districts crossed with the analysed period range.
    pub grid: ReferenceGrid,
    /// Day-index calendar.
    pub calendar: PeriodCalendar,
}

impl Dataset {
    /// Builds a dataset from loaded events and districts.
    ///
    /// The period range comes from `data.first_period`/`data.last_period`
    /// where set, otherwise from the earliest and latest case.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if no period range
    /// can be determined or it is empty.
    pub fn new(
        events: Vec<CaseEvent>,
        districts: Vec<outbreak_models::District>,
        data: &DataConfig,
    ) -> Result<Self, DetectionError> {
        let calendar = PeriodCalendar::new(data.origin);
        let periods: Vec<u32> = events
            .iter()
            .filter_map(|e| calendar.period_of(e.time))
            .collect();

        let first_period = data
            .first_period
            .or_else(|| periods.iter().copied().min())
            .ok_or_else(|| DetectionError::invalid("no cases to derive a first period from"))?;
        let last_period = data
            .last_period
            .or_else(|| periods.iter().copied().max())
            .ok_or_else(|| DetectionError::invalid("no cases to derive a last period from"))?;

        if first_period == 0 || first_period > last_period {
            return Err(DetectionError::invalid(format!(
                "period range {first_period}..={last_period} is empty"
            )));
        }

        log::info!(
            "Reference grid: {} districts over periods {} ({first_period}) to {} ({last_period})",
            districts.len(),
            calendar.period_label(first_period),
            calendar.period_label(last_period)
        );

        Ok(Self {
            events,
            grid: ReferenceGrid {
                districts,
                first_period,
                last_period,
            },
            calendar,
        })
    }

    /// Events of the configured case type, or all events if none is set.
    #[must_use]
    pub fn events_of_type(&self, case_type: Option<&str>) -> Vec<CaseEvent> {
        self.events
            .iter()
            .filter(|e| case_type.is_none_or(|t| e.case_type == t))
            .cloned()
            .collect()
    }

    /// Loads the zone catalog file if one is configured, otherwise builds
    /// the k-nearest-neighbour catalog over district centroids.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone file cannot be read or references an
    /// unknown district, or the k-NN catalog cannot be built.
    pub fn zone_catalog(&self, data: &DataConfig) -> Result<ZoneCatalog, IngestError> {
        match &data.zones {
            Some(path) => load_zone_catalog(path, &self.grid),
            None => {
                let districts = self.grid.districts.len();
                let k = if data.neighbours > districts && districts > 0 {
                    log::warn!(
                        "neighbours = {} exceeds the {districts} districts; using {districts}",
                        data.neighbours
                    );
                    districts
                } else {
                    data.neighbours
                };
                Ok(ZoneCatalog::knn_for_grid(&self.grid, k)?)
            }
        }
    }
}

/// Loads cases and districts named by the `[data]` section.
///
/// # Errors
///
/// Returns an error if either file cannot be read or parsed, or the period
/// range is empty.
pub fn load_dataset(data: &DataConfig) -> Result<Dataset, IngestError> {
    let events = load_cases(&data.cases)?;
    let districts = load_districts(&data.districts)?;
    Ok(Dataset::new(events, districts, data)?)
}
