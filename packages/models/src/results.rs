//! Per-step result types emitted by the detection engines.

use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, StepFailure};

/// Frequentist scan statistic result for one surveillance step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Log-likelihood ratio of the most likely cluster.
    pub observed_score: f64,
    /// Upper `1 − α` quantile of the replicate pool.
    pub critical_value: f64,
    /// Rank-based Monte Carlo p-value.
    pub p_value: f64,
    /// Index of the most likely cluster's zone in the catalog.
    pub zone: usize,
    /// Number of most recent periods covered by the cluster.
    pub duration: usize,
    /// Observed over expected count inside the cluster.
    pub relative_risk_inside: f64,
    /// Observed over expected count outside the cluster, if anything lies
    /// outside it.
    pub relative_risk_outside: Option<f64>,
    /// Size of the replicate pool the p-value was computed against.
    pub replicates: usize,
}

/// Bayesian scan statistic result for one surveillance step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesScanResult {
    /// Posterior probability of an outbreak in the MLC.
    pub mlc_posterior: f64,
    /// Log Bayes factor of "outbreak somewhere" against "no outbreak".
    pub log_bayes_factor: f64,
    /// Index of the MLC's zone in the catalog.
    pub zone: usize,
    /// Duration of the MLC in periods.
    pub duration: usize,
    /// Posterior probability of an outbreak anywhere.
    pub outbreak_posterior: f64,
    /// Relative risk with the highest posterior mass for the MLC.
    pub map_relative_risk: f64,
    /// Posterior over the relative-risk grid for the MLC. This becomes the
    /// next step's prior.
    pub relative_risk_posterior: Vec<f64>,
}

/// Hotelling T² result for one surveillance step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct T2Result {
    /// Observed T² statistic of the current observation.
    pub t2: f64,
    /// Critical value at the configured significance level.
    pub critical_value: f64,
    /// P-value from the scaled F distribution.
    pub p_value: f64,
    /// Number of baseline observations.
    pub observations: usize,
}

impl T2Result {
    /// Whether the statistic crosses the control limit.
    #[must_use]
    pub fn is_alarm(&self) -> bool {
        self.t2 > self.critical_value
    }
}

/// A circular space-time cluster flagged by the point-process detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAlarm {
    /// Index (into the prepared event sequence) of the event at which the
    /// statistic first crossed the threshold.
    pub alarm_index: usize,
    /// Index of the event estimated to start the cluster.
    pub onset_index: usize,
    /// Day index of the alarm event.
    pub alarm_day: f64,
    /// Day index of the onset event.
    pub onset_day: f64,
    /// Cluster centre x coordinate (the onset event's location).
    pub x: f64,
    /// Cluster centre y coordinate.
    pub y: f64,
    /// Cluster radius.
    pub radius: f64,
    /// Detection statistic at the alarm.
    pub statistic: f64,
}

/// Outcome of one surveillance step: either a result or a recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome<T> {
    /// The step produced a result.
    Completed(T),
    /// The step failed; the run continued.
    Failed(StepFailure),
}

/// One engine's output for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord<T> {
    /// Period index of the step.
    pub period: u32,
    /// Result or failure.
    pub outcome: StepOutcome<T>,
}

impl<T> StepRecord<T> {
    /// Builds a record from an engine result.
    #[must_use]
    pub fn from_result(period: u32, result: Result<T, DetectionError>) -> Self {
        let outcome = match result {
            Ok(value) => StepOutcome::Completed(value),
            Err(err) => StepOutcome::Failed(StepFailure::from(err)),
        };
        Self { period, outcome }
    }

    /// The result, if the step completed.
    #[must_use]
    pub const fn result(&self) -> Option<&T> {
        match &self.outcome {
            StepOutcome::Completed(value) => Some(value),
            StepOutcome::Failed(_) => None,
        }
    }

    /// The failure, if the step failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&StepFailure> {
        match &self.outcome {
            StepOutcome::Completed(_) => None,
            StepOutcome::Failed(failure) => Some(failure),
        }
    }
}
