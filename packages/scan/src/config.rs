//! Scan engine configuration (`[scan]` and `[bayes]` TOML sections).

use outbreak_models::DetectionError;
use serde::{Deserialize, Serialize};

use crate::bayes::RelRiskGrid;
use crate::replicates::ReplicatePolicy;

/// Seed used for Monte Carlo replicates unless configured otherwise.
pub const DEFAULT_SEED: u64 = 20_160_101;

/// Frequentist scan and sliding-window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Look-back window length in periods.
    pub window: usize,
    /// Null replicates generated per step.
    pub n_mc: usize,
    /// Significance level for the critical value.
    pub alpha: f64,
    /// Monte Carlo seed; `None` seeds from the OS and is not reproducible.
    pub seed: Option<u64>,
    /// Whether replicates pool across steps.
    pub replicate_policy: ReplicatePolicy,
    /// First surveillance period; defaults to the first period with a
    /// full window.
    pub start: Option<u32>,
    /// Last surveillance period; defaults to the last period.
    pub end: Option<u32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window: 6,
            n_mc: 99,
            alpha: 0.05,
            seed: Some(DEFAULT_SEED),
            replicate_policy: ReplicatePolicy::default(),
            start: None,
            end: None,
        }
    }
}

impl ScanConfig {
    /// Checks settings that do not depend on the data.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] for a zero window,
    /// zero replicates, an `alpha` outside `(0, 1)`, or `start > end`.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.window == 0 {
            return Err(DetectionError::invalid("scan window must be at least 1 period"));
        }
        if self.n_mc == 0 {
            return Err(DetectionError::invalid("n_mc must be at least 1"));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(DetectionError::invalid(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if let (Some(start), Some(end)) = (self.start, self.end)
            && start > end
        {
            return Err(DetectionError::invalid(format!(
                "scan start {start} is after end {end}"
            )));
        }
        Ok(())
    }
}

/// Bayesian scan settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesConfig {
    /// Prior probability that an outbreak is present anywhere.
    pub outbreak_prob: f64,
    /// Gamma prior shape under the null.
    pub alpha_null: f64,
    /// Gamma prior rate under the null.
    pub beta_null: f64,
    /// Relative-risk grid.
    pub relrisk: RelRiskGrid,
}

impl Default for BayesConfig {
    fn default() -> Self {
        Self {
            outbreak_prob: 1e-7,
            alpha_null: 1.0,
            beta_null: 1.0,
            relrisk: RelRiskGrid::default(),
        }
    }
}

impl BayesConfig {
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if the outbreak
    /// probability is outside `(0, 1)`, a gamma parameter is not positive,
    /// or the relative-risk grid is malformed.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(self.outbreak_prob > 0.0 && self.outbreak_prob < 1.0) {
            return Err(DetectionError::invalid(format!(
                "outbreak_prob must be in (0, 1), got {}",
                self.outbreak_prob
            )));
        }
        if !(self.alpha_null > 0.0 && self.beta_null > 0.0) {
            return Err(DetectionError::invalid(
                "alpha_null and beta_null must be positive",
            ));
        }
        self.relrisk.validate()
    }
}
