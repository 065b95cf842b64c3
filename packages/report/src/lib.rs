#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report files for a detection run.
//!
//! Each engine's step records become one CSV (`scan.csv`, `bayes.csv`,
//! `hotelling.csv`), the aggregator's tables are written as
//! `district_periods.csv` and `state_periods.csv`, and the per-step
//! relative-risk posteriors and the space-time cluster outcome are written
//! as JSON.

pub mod rows;

use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use outbreak_models::results::{BayesScanResult, ClusterAlarm, ScanResult, StepRecord, T2Result};
use outbreak_models::{CaseEvent, DistrictPeriod, PeriodCalendar, ReferenceGrid, StatePeriod};
use outbreak_stcd::{StcdConfig, StcdOutcome};
use outbreak_zones::ZoneCatalog;
use serde::Serialize;

use rows::{BayesRow, HotellingRow, ScanRow, write_rows};

/// Errors raised while writing report files.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// I/O error creating or writing a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV serialisation error.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// JSON serialisation error.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// Path to the JSON file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Zone index to `;`-joined district tile IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneLabels {
    labels: Vec<String>,
}

impl ZoneLabels {
    /// Labels every zone in the catalog by its member tile IDs.
    #[must_use]
    pub fn new(catalog: &ZoneCatalog, grid: &ReferenceGrid) -> Self {
        let labels = catalog
            .iter()
            .map(|zone| {
                zone.members()
                    .iter()
                    .filter_map(|&d| grid.districts.get(d))
                    .map(|district| district.tile_id.as_str())
                    .collect::<Vec<_>>()
                    .join(";")
            })
            .collect();
        Self { labels }
    }

    /// Uses precomputed labels.
    #[must_use]
    pub const fn from_labels(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Label of a zone.
    #[must_use]
    pub fn get(&self, zone: usize) -> Option<&str> {
        self.labels.get(zone).map(String::as_str)
    }
}

#[derive(Debug, Serialize)]
struct PosteriorStep<'a> {
    period: u32,
    month: String,
    zone: usize,
    duration: usize,
    posterior: &'a [f64],
}

#[derive(Debug, Serialize)]
struct PosteriorReport<'a> {
    relative_risk: &'a [f64],
    steps: Vec<PosteriorStep<'a>>,
}

#[derive(Debug, Serialize)]
struct AlarmReport<'a> {
    #[serde(flatten)]
    alarm: &'a ClusterAlarm,
    alarm_case: Option<u64>,
    onset_case: Option<u64>,
    alarm_date: Option<NaiveDate>,
    onset_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct StcdReport<'a> {
    events: usize,
    case_type: Option<&'a str>,
    radius: f64,
    epsilon: f64,
    threshold: f64,
    cusum: bool,
    statistic: &'a [f64],
    alarm: Option<AlarmReport<'a>>,
}

/// Writes report files into one output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    calendar: PeriodCalendar,
}

impl ReportWriter {
    /// Creates the output directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if the directory cannot be created.
    pub fn create(dir: &Path, calendar: PeriodCalendar) -> Result<Self, ReportError> {
        std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            calendar,
        })
    }

    /// The output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create_file(&self, name: &str) -> Result<(PathBuf, BufWriter<std::fs::File>), ReportError> {
        let path = self.dir.join(name);
        let file = std::fs::File::create(&path).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok((path, BufWriter::new(file)))
    }

    fn write_csv<S: Serialize>(
        &self,
        name: &str,
        rows: impl IntoIterator<Item = S>,
    ) -> Result<PathBuf, ReportError> {
        let (path, writer) = self.create_file(name)?;
        let count = write_rows(writer, rows).map_err(|source| ReportError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Wrote {count} rows to {}", path.display());
        Ok(path)
    }

    fn write_json<S: Serialize>(&self, name: &str, value: &S) -> Result<PathBuf, ReportError> {
        let (path, mut writer) = self.create_file(name)?;
        serde_json::to_writer_pretty(&mut writer, value).map_err(|source| ReportError::Json {
            path: path.display().to_string(),
            source,
        })?;
        writer
            .write_all(b"\n")
            .and_then(|()| writer.flush())
            .map_err(|source| ReportError::Io {
                path: path.display().to_string(),
                source,
            })?;
        log::info!("Wrote {}", path.display());
        Ok(path)
    }

    /// `district_periods.csv`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_district_periods(&self, rows: &[DistrictPeriod]) -> Result<PathBuf, ReportError> {
        self.write_csv("district_periods.csv", rows)
    }

    /// `state_periods.csv`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_state_periods(&self, rows: &[StatePeriod]) -> Result<PathBuf, ReportError> {
        self.write_csv("state_periods.csv", rows)
    }

    /// `scan.csv`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_scan(
        &self,
        records: &[StepRecord<ScanResult>],
        zones: &ZoneLabels,
    ) -> Result<PathBuf, ReportError> {
        self.write_csv(
            "scan.csv",
            records.iter().map(|r| ScanRow::new(r, &self.calendar, zones)),
        )
    }

    /// `bayes.csv` and `bayes_posterior.json`. `relative_risk` is the grid
    /// the posteriors are defined over.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn write_bayes(
        &self,
        records: &[StepRecord<BayesScanResult>],
        zones: &ZoneLabels,
        relative_risk: &[f64],
    ) -> Result<(PathBuf, PathBuf), ReportError> {
        let csv = self.write_csv(
            "bayes.csv",
            records.iter().map(|r| BayesRow::new(r, &self.calendar, zones)),
        )?;

        let report = PosteriorReport {
            relative_risk,
            steps: records
                .iter()
                .filter_map(|record| {
                    record.result().map(|r| PosteriorStep {
                        period: record.period,
                        month: self.calendar.period_label(record.period),
                        zone: r.zone,
                        duration: r.duration,
                        posterior: &r.relative_risk_posterior,
                    })
                })
                .collect(),
        };
        let json = self.write_json("bayes_posterior.json", &report)?;

        Ok((csv, json))
    }

    /// `hotelling.csv`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_hotelling(
        &self,
        records: &[StepRecord<T2Result>],
    ) -> Result<PathBuf, ReportError> {
        self.write_csv(
            "hotelling.csv",
            records.iter().map(|r| HotellingRow::new(r, &self.calendar)),
        )
    }

    /// `stcd.json`. `events` is the prepared sequence the detector ran on;
    /// alarm indices are mapped back to case IDs and dates through it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_stcd(
        &self,
        events: &[CaseEvent],
        config: &StcdConfig,
        outcome: &StcdOutcome,
    ) -> Result<PathBuf, ReportError> {
        let report = StcdReport {
            events: events.len(),
            case_type: config.case_type.as_deref(),
            radius: config.radius,
            epsilon: config.epsilon,
            threshold: config.threshold,
            cusum: config.cusum,
            statistic: &outcome.statistic,
            alarm: outcome.alarm.as_ref().map(|alarm| AlarmReport {
                alarm,
                alarm_case: events.get(alarm.alarm_index).map(|e| e.id),
                onset_case: events.get(alarm.onset_index).map(|e| e.id),
                alarm_date: self.calendar.date_of(alarm.alarm_day),
                onset_date: self.calendar.date_of(alarm.onset_day),
            }),
        };
        self.write_json("stcd.json", &report)
    }
}
