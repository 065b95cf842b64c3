//! Bayesian scan statistic under a gamma-Poisson (negative binomial) model.
//!
//! Every (zone, duration) cylinder `S` is an outbreak hypothesis with a
//! multiplicative relative risk `m` drawn from a discrete grid. The prior
//! over `m` is carried from step to step: the posterior over `m` for this
//! step's most likely cluster becomes the next step's prior.

use outbreak_models::DetectionError;
use outbreak_models::results::BayesScanResult;
use outbreak_zones::ZoneCatalog;
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;

use crate::config::BayesConfig;
use crate::window::{Cylinder, ObservationWindow};

/// Evenly spaced relative-risk support `min, min + step, …, max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelRiskGrid {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for RelRiskGrid {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 15.0,
            step: 0.1,
        }
    }
}

impl RelRiskGrid {
    /// Checks that the grid is non-empty and strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if a bound is not
    /// finite, `min` is not positive, `max < min`, or `step` is not
    /// positive.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !self.min.is_finite() || !self.max.is_finite() || !self.step.is_finite() {
            return Err(DetectionError::invalid("relative-risk grid bounds must be finite"));
        }
        if self.min <= 0.0 {
            return Err(DetectionError::invalid(format!(
                "relative-risk grid must start above zero, got {}",
                self.min
            )));
        }
        if self.max < self.min || self.step <= 0.0 {
            return Err(DetectionError::invalid(format!(
                "malformed relative-risk grid {}..={} step {}",
                self.min, self.max, self.step
            )));
        }
        Ok(())
    }

    /// Grid values. Assumes a validated grid.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn values(&self) -> Vec<f64> {
        let steps = ((self.max - self.min) / self.step + 1e-9).floor() as usize;
        (0..=steps)
            .map(|i| (i as f64).mul_add(self.step, self.min))
            .collect()
    }
}

/// Probability mass over the relative-risk grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelRiskPrior {
    values: Vec<f64>,
    probs: Vec<f64>,
}

impl RelRiskPrior {
    /// Uniform mass over the grid.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if the grid is
    /// malformed.
    #[allow(clippy::cast_precision_loss)]
    pub fn uniform(grid: &RelRiskGrid) -> Result<Self, DetectionError> {
        grid.validate()?;
        let values = grid.values();
        let mass = 1.0 / values.len() as f64;
        Ok(Self {
            probs: vec![mass; values.len()],
            values,
        })
    }

    /// A prior with explicit weights, normalised to sum to one.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if the lengths
    /// differ, the support is empty or not positive, a weight is negative
    /// or not finite, or all weights are zero.
    pub fn new(values: Vec<f64>, weights: Vec<f64>) -> Result<Self, DetectionError> {
        if values.is_empty() || values.len() != weights.len() {
            return Err(DetectionError::invalid(format!(
                "relative-risk prior has {} values and {} weights",
                values.len(),
                weights.len()
            )));
        }
        if values.iter().any(|&v| !v.is_finite() || v <= 0.0) {
            return Err(DetectionError::invalid(
                "relative-risk values must be positive and finite",
            ));
        }
        if weights.iter().any(|&w| !w.is_finite() || w < 0.0) {
            return Err(DetectionError::invalid(
                "relative-risk prior weights must be non-negative and finite",
            ));
        }

        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(DetectionError::invalid("relative-risk prior has no mass"));
        }

        Ok(Self {
            values,
            probs: weights.into_iter().map(|w| w / sum).collect(),
        })
    }

    /// Relative-risk support.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Probability of each support value.
    #[must_use]
    pub fn probs(&self) -> &[f64] {
        &self.probs
    }
}

/// Log of the negative binomial marginal of `count` given baseline
/// `baseline` and a `Gamma(shape, rate)` prior on the rate multiplier.
///
/// A zero baseline forces a zero count: the result is `0` for `count == 0`
/// and `-inf` otherwise.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn log_negbin(count: f64, shape: f64, rate: f64, baseline: f64) -> f64 {
    if baseline <= 0.0 {
        return if count == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    let denom = rate + baseline;
    ln_gamma(shape + count) - ln_gamma(shape) - ln_gamma(count + 1.0)
        + shape * (rate / denom).ln()
        + count * (baseline / denom).ln()
}

/// `ln Σ exp(xᵢ)` without overflow; `-inf` for an empty or all `-inf`
/// input.
pub fn log_sum_exp(terms: impl IntoIterator<Item = f64>) -> f64 {
    let terms: Vec<f64> = terms.into_iter().collect();
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + terms.iter().map(|&x| (x - max).exp()).sum::<f64>().ln()
}

/// Runs the Bayesian scan over one window.
///
/// Every cell is modelled independently as `c ~ Poisson(q·μ)` with a
/// gamma prior on `q`. Under the null `q ~ Gamma(α₀, β₀)` everywhere;
/// under outbreak hypothesis `(S, m)` the cells of cylinder `S` instead use
/// `Gamma(m·α₀, β₀)`. Cylinders with no expected count are skipped.
///
/// Returns the step result and the relative-risk prior for the next step.
///
/// # Errors
///
/// Returns [`DetectionError::DegenerateZone`] if no cylinder has a
/// positive expected count or the data are impossible under the null (a
/// case in a cell with no expected count).
#[allow(clippy::cast_precision_loss)]
pub fn bayes_scan(
    window: &ObservationWindow,
    catalog: &ZoneCatalog,
    prior: &RelRiskPrior,
    config: &BayesConfig,
) -> Result<(BayesScanResult, RelRiskPrior), DetectionError> {
    let (alpha, beta) = (config.alpha_null, config.beta_null);
    let len = window.len();

    let mut null_likelihood = 0.0;
    // shift[d][duration][m]: log-likelihood change when the last
    // `duration` periods of district `d` carry relative risk `m`.
    let shift: Vec<Vec<Vec<f64>>> = window
        .counts()
        .iter()
        .zip(window.expected())
        .map(|(counts, expected)| {
            let mut acc = vec![0.0; prior.values().len()];
            let mut tails = Vec::with_capacity(len + 1);
            tails.push(acc.clone());
            for (&count, &baseline) in counts.iter().zip(expected).rev() {
                let count = count as f64;
                let null = log_negbin(count, alpha, beta, baseline);
                null_likelihood += null;
                if baseline > 0.0 {
                    for (a, &m) in acc.iter_mut().zip(prior.values()) {
                        *a += log_negbin(count, m * alpha, beta, baseline) - null;
                    }
                }
                tails.push(acc.clone());
            }
            tails
        })
        .collect();

    if !null_likelihood.is_finite() {
        return Err(DetectionError::degenerate(format!(
            "periods {}..={} have cases in cells with zero expected count",
            window.first(),
            window.last()
        )));
    }

    let log_prior_m: Vec<f64> = prior.probs().iter().map(|p| p.ln()).collect();
    let rr_terms = |cylinder: &Cylinder| -> Vec<f64> {
        let members = catalog
            .get(cylinder.zone)
            .map_or(&[][..], outbreak_zones::Zone::members);
        log_prior_m
            .iter()
            .enumerate()
            .map(|(k, &log_pi)| {
                log_pi
                    + null_likelihood
                    + members
                        .iter()
                        .map(|&d| shift[d][cylinder.duration][k])
                        .sum::<f64>()
            })
            .collect()
    };

    let cylinders = window.cylinders(catalog);
    // (index into `cylinders`, l(S))
    let scored: Vec<(usize, f64)> = cylinders
        .iter()
        .enumerate()
        .filter(|(_, c)| c.expected > 0.0)
        .map(|(i, c)| (i, log_sum_exp(rr_terms(c))))
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for &(i, l) in &scored {
        if l.is_finite() && best.is_none_or(|(_, b)| l > b) {
            best = Some((i, l));
        }
    }
    let Some((mlc_index, mlc_likelihood)) = best else {
        return Err(DetectionError::degenerate(format!(
            "every cylinder in periods {}..={} has zero expected count",
            window.first(),
            window.last()
        )));
    };

    let hypotheses = scored.len() as f64;
    let log_prior_s = config.outbreak_prob.ln() - hypotheses.ln();
    let log_h0 = (-config.outbreak_prob).ln_1p() + null_likelihood;
    let log_h1 = log_sum_exp(scored.iter().map(|&(_, l)| log_prior_s + l));
    let log_evidence = log_sum_exp([log_h0, log_h1]);

    let mlc = cylinders[mlc_index];
    let terms = rr_terms(&mlc);
    let norm = log_sum_exp(terms.iter().copied());
    let posterior: Vec<f64> = terms.iter().map(|&t| (t - norm).exp()).collect();

    let mut map_index = 0;
    for (i, &p) in posterior.iter().enumerate() {
        if p > posterior[map_index] {
            map_index = i;
        }
    }

    log::debug!(
        "Bayesian MLC for {}..={}: zone {} duration {} (l = {mlc_likelihood:.3}, l0 = {null_likelihood:.3})",
        window.first(),
        window.last(),
        mlc.zone,
        mlc.duration
    );

    let result = BayesScanResult {
        mlc_posterior: (log_prior_s + mlc_likelihood - log_evidence).exp(),
        log_bayes_factor: log_sum_exp(scored.iter().map(|&(_, l)| l))
            - hypotheses.ln()
            - null_likelihood,
        zone: mlc.zone,
        duration: mlc.duration,
        outbreak_posterior: (log_h1 - log_evidence).exp(),
        map_relative_risk: prior.values()[map_index],
        relative_risk_posterior: posterior.clone(),
    };
    let next_prior = RelRiskPrior::new(prior.values().to_vec(), posterior)?;

    Ok((result, next_prior))
}

#[cfg(test)]
mod tests {
    use outbreak_aggregate::CountMatrix;

    use super::*;

    fn config() -> BayesConfig {
        BayesConfig::default()
    }

    fn clustered_window(hot: u64) -> ObservationWindow {
        let matrix = CountMatrix::from_counts(
            1,
            vec![100.0, 100.0, 100.0, 100.0],
            vec![
                vec![2, 3, hot],
                vec![2, 2, 3],
                vec![3, 2, 2],
                vec![2, 3, 2],
            ],
        )
        .unwrap();
        ObservationWindow::ending_at(&matrix, 3, 3).unwrap()
    }

    fn catalog() -> ZoneCatalog {
        ZoneCatalog::from_members(4, vec![vec![0], vec![1], vec![2], vec![3], vec![0, 1]])
            .unwrap()
    }

    #[test]
    fn default_grid_has_141_values() {
        let values = RelRiskGrid::default().values();
        assert_eq!(values.len(), 141);
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert!((values[140] - 15.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_grid_is_rejected() {
        let grid = RelRiskGrid {
            min: 2.0,
            max: 1.0,
            step: 0.1,
        };
        assert!(matches!(
            RelRiskPrior::uniform(&grid),
            Err(DetectionError::InvalidConfiguration { .. })
        ));
        let grid = RelRiskGrid {
            step: 0.0,
            ..RelRiskGrid::default()
        };
        assert!(grid.validate().is_err());
    }

    #[test]
    fn explicit_prior_is_normalised() {
        let prior = RelRiskPrior::new(vec![1.0, 2.0], vec![1.0, 3.0]).unwrap();
        assert!((prior.probs()[0] - 0.25).abs() < 1e-12);
        assert!(RelRiskPrior::new(vec![1.0], vec![0.0]).is_err());
        assert!(RelRiskPrior::new(vec![1.0, 2.0], vec![1.0]).is_err());
    }

    #[test]
    fn negbin_reduces_to_geometric() {
        // a = β = B = 1 gives P(C) = (1/2)^(C+1).
        for c in 0..5 {
            let c = f64::from(c);
            let expected = (c + 1.0) * 0.5_f64.ln();
            assert!((log_negbin(c, 1.0, 1.0, 1.0) - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn negbin_pmf_sums_to_one() {
        let total: f64 = (0..400)
            .map(|c| log_negbin(f64::from(c), 2.5, 1.5, 3.0).exp())
            .sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn negbin_zero_baseline() {
        assert!(log_negbin(0.0, 1.0, 1.0, 0.0).abs() < f64::EPSILON);
        assert_eq!(log_negbin(2.0, 1.0, 1.0, 0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn log_sum_exp_is_stable() {
        let v = log_sum_exp([-1000.0, -1000.0]);
        assert!((v - (-1000.0 + 2.0_f64.ln())).abs() < 1e-9);
        assert_eq!(log_sum_exp([]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp([f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }

    #[test]
    fn posterior_sums_to_one_and_finds_hot_zone() {
        let window = clustered_window(40);
        let prior = RelRiskPrior::uniform(&RelRiskGrid::default()).unwrap();
        let (result, next) = bayes_scan(&window, &catalog(), &prior, &config()).unwrap();

        let sum: f64 = result.relative_risk_posterior.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((next.probs().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(result.zone, 0);
        assert_eq!(result.duration, 1);
        assert!(result.map_relative_risk > 1.0);
        assert!(result.log_bayes_factor > 0.0);
        assert!(result.outbreak_posterior >= result.mlc_posterior);
        assert!(result.outbreak_posterior <= 1.0);
    }

    #[test]
    fn carried_prior_changes_next_posterior() {
        let catalog = catalog();
        let uniform = RelRiskPrior::uniform(&RelRiskGrid::default()).unwrap();

        let first = clustered_window(40);
        let (_, carried) = bayes_scan(&first, &catalog, &uniform, &config()).unwrap();

        let second = clustered_window(12);
        let (with_carry, _) = bayes_scan(&second, &catalog, &carried, &config()).unwrap();
        let (with_reset, _) = bayes_scan(&second, &catalog, &uniform, &config()).unwrap();

        let divergence: f64 = with_carry
            .relative_risk_posterior
            .iter()
            .zip(&with_reset.relative_risk_posterior)
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(divergence > 1e-6, "divergence = {divergence}");
    }

    #[test]
    fn identical_zones_tie_break_to_lower_index() {
        let matrix = CountMatrix::from_counts(
            1,
            vec![50.0, 50.0, 50.0],
            vec![vec![9], vec![9], vec![1]],
        )
        .unwrap();
        let window = ObservationWindow::ending_at(&matrix, 1, 1).unwrap();
        let catalog = ZoneCatalog::from_members(3, vec![vec![2], vec![0], vec![1]]).unwrap();
        let prior = RelRiskPrior::uniform(&RelRiskGrid::default()).unwrap();
        let (result, _) = bayes_scan(&window, &catalog, &prior, &config()).unwrap();
        assert_eq!(result.zone, 1);
    }

    #[test]
    fn empty_window_is_degenerate() {
        let matrix =
            CountMatrix::from_counts(1, vec![10.0, 10.0], vec![vec![0], vec![0]]).unwrap();
        let window = ObservationWindow::ending_at(&matrix, 1, 1).unwrap();
        let catalog = ZoneCatalog::from_members(2, vec![vec![0], vec![1]]).unwrap();
        let prior = RelRiskPrior::uniform(&RelRiskGrid::default()).unwrap();
        assert!(matches!(
            bayes_scan(&window, &catalog, &prior, &config()),
            Err(DetectionError::DegenerateZone { .. })
        ));
    }
}
