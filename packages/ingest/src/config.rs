//! TOML run configuration.
//!
//! Every section and field is optional:
//!
//! ```toml
//! [data]
//! cases = "data/cases.csv"
//! districts = "data/districts.geojson"
//! origin = "2002-01-01"
//! case_type = "B"
//!
//! [scan]
//! window = 6
//! n_mc = 999
//! replicate_policy = "per_step"
//!
//! [bayes.relrisk]
//! max = 10.0
//!
//! [output]
//! dir = "results"
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use outbreak_hotelling::HotellingConfig;
use outbreak_models::DetectionError;
use outbreak_scan::{BayesConfig, ScanConfig};
use outbreak_stcd::StcdConfig;
use serde::{Deserialize, Serialize};

use crate::IngestError;

/// `[data]` section: input files and the analysed period range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Case events CSV.
    pub cases: PathBuf,
    /// District CSV or `GeoJSON`.
    pub districts: PathBuf,
    /// Zone catalog CSV; the k-NN catalog is built when absent.
    pub zones: Option<PathBuf>,
    /// Date of day index 0.
    pub origin: NaiveDate,
    /// Case type counted by the aggregator; `None` counts every type.
    pub case_type: Option<String>,
    /// First period of the reference grid; defaults to the earliest case.
    pub first_period: Option<u32>,
    /// Last period of the reference grid; defaults to the latest case.
    pub last_period: Option<u32>,
    /// Zone size for the k-NN catalog.
    pub neighbours: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            cases: PathBuf::from("cases.csv"),
            districts: PathBuf::from("districts.csv"),
            zones: None,
            origin: NaiveDate::from_ymd_opt(2002, 1, 1).unwrap_or_default(),
            case_type: None,
            first_period: None,
            last_period: None,
            neighbours: 10,
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the report files are written to.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

/// The whole run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Inputs.
    pub data: DataConfig,
    /// Frequentist scan and sliding window.
    pub scan: ScanConfig,
    /// Bayesian scan.
    pub bayes: BayesConfig,
    /// Hotelling T² chart.
    pub hotelling: HotellingConfig,
    /// Space-time cluster detection.
    pub stcd: StcdConfig,
    /// Outputs.
    pub output: OutputConfig,
}

impl AnalysisConfig {
    /// Checks every section. Run once before any detection loop.
    ///
    /// # Errors
    ///
    /// Returns the first [`DetectionError::InvalidConfiguration`] found.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.data.neighbours == 0 {
            return Err(DetectionError::invalid("data.neighbours must be at least 1"));
        }
        if let (Some(first), Some(last)) = (self.data.first_period, self.data.last_period)
            && first > last
        {
            return Err(DetectionError::invalid(format!(
                "data period range {first}..={last} is empty"
            )));
        }
        self.scan.validate()?;
        self.bayes.validate()?;
        self.hotelling.validate()?;
        self.stcd.validate()
    }
}

/// Parses a TOML configuration string.
///
/// # Errors
///
/// Returns the parser's message if the TOML is malformed or a field has
/// the wrong type.
pub fn parse_config_toml(toml_str: &str) -> Result<AnalysisConfig, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}

/// Reads and parses a configuration file.
///
/// # Errors
///
/// Returns [`IngestError::Io`] if the file cannot be read and
/// [`IngestError::Toml`] if it does not parse.
pub fn load_config(path: &Path) -> Result<AnalysisConfig, IngestError> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = parse_config_toml(&text).map_err(|message| IngestError::Toml {
        path: path.display().to_string(),
        message,
    })?;
    log::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use outbreak_scan::{DEFAULT_SEED, ReplicatePolicy};

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config_toml("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.scan.window, 6);
        assert_eq!(config.scan.seed, Some(DEFAULT_SEED));
        assert_eq!(config.data.origin, NaiveDate::from_ymd_opt(2002, 1, 1).unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config_toml(
            r#"
            [data]
            cases = "in/cases.csv"
            zones = "in/zones.csv"
            origin = "2001-12-31"
            case_type = "B"
            last_period = 48

            [scan]
            n_mc = 999
            seed = 7
            replicate_policy = "per_step"

            [bayes.relrisk]
            max = 10.0

            [hotelling]
            alpha = 0.01

            [stcd]
            radius = 75.0
            cusum = true

            [output]
            dir = "results"
            "#,
        )
        .unwrap();

        assert_eq!(config.data.cases, PathBuf::from("in/cases.csv"));
        assert_eq!(config.data.districts, PathBuf::from("districts.csv"));
        assert_eq!(config.data.zones, Some(PathBuf::from("in/zones.csv")));
        assert_eq!(config.data.origin, NaiveDate::from_ymd_opt(2001, 12, 31).unwrap());
        assert_eq!(config.data.case_type.as_deref(), Some("B"));
        assert_eq!(config.data.last_period, Some(48));
        assert_eq!(config.scan.n_mc, 999);
        assert_eq!(config.scan.window, 6);
        assert_eq!(config.scan.seed, Some(7));
        assert_eq!(config.scan.replicate_policy, ReplicatePolicy::PerStep);
        assert!((config.bayes.relrisk.max - 10.0).abs() < f64::EPSILON);
        assert!((config.bayes.relrisk.min - 1.0).abs() < f64::EPSILON);
        assert!((config.hotelling.alpha - 0.01).abs() < f64::EPSILON);
        assert!((config.stcd.radius - 75.0).abs() < f64::EPSILON);
        assert!(config.stcd.cusum);
        assert_eq!(config.output.dir, PathBuf::from("results"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(parse_config_toml("[scan]\nwindow = \"six\"").is_err());
        assert!(parse_config_toml("[scan").is_err());
    }

    #[test]
    fn validation_covers_every_section() {
        let mut config = AnalysisConfig::default();
        config.scan.window = 0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.stcd.epsilon = 0.0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.data.first_period = Some(10);
        config.data.last_period = Some(2);
        assert!(config.validate().is_err());
    }
}
