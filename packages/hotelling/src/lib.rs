#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hotelling T² control chart over state-level monthly counts.
//!
//! Each surveillance period is compared against every earlier period (an
//! expanding baseline). With `n` baseline observations in `p` states:
//!
//! ```text
//! T²   = (x_t − x̄)ᵀ S⁻¹ (x_t − x̄)
//! UCL  = p(n − 1)/(n − p) · F⁻¹_{p, n−p}(1 − α)
//! p    = P(F_{p, n−p} > T² (n − p) / (p(n − 1)))
//! ```
//!
//! At least `p + 1` baseline observations are needed for `S` to be
//! invertible; fewer is recorded as [`DetectionError::SingularCovariance`].

pub mod fdist;
pub mod linalg;

use outbreak_aggregate::StateMatrix;
use outbreak_models::DetectionError;
use outbreak_models::progress::ProgressCallback;
use outbreak_models::results::{StepRecord, T2Result};
use serde::{Deserialize, Serialize};

/// `[hotelling]` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotellingConfig {
    /// Significance level of the control limit.
    pub alpha: f64,
    /// Number of leading periods to skip before the first step.
    pub start_offset: u32,
    /// Last period to evaluate; defaults to the last period of the data.
    pub end: Option<u32>,
}

impl Default for HotellingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            start_offset: 0,
            end: None,
        }
    }
}

impl HotellingConfig {
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if `alpha` is not in
    /// `(0, 1)`.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(DetectionError::invalid(format!(
                "hotelling alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Upper control limit for `n` baseline observations in `p` dimensions.
///
/// # Errors
///
/// Returns [`DetectionError::SingularCovariance`] if `n ≤ p`.
#[allow(clippy::cast_precision_loss)]
pub fn critical_value(
    dimensions: usize,
    observations: usize,
    alpha: f64,
) -> Result<f64, DetectionError> {
    if observations <= dimensions {
        return Err(DetectionError::SingularCovariance {
            observations,
            dimensions,
        });
    }
    let (p, n) = (dimensions as f64, observations as f64);
    let f = fdist::quantile(1.0 - alpha, p, n - p)?;
    Ok(p * (n - 1.0) / (n - p) * f)
}

/// T² of `current` against `history`.
///
/// # Errors
///
/// Returns [`DetectionError::SingularCovariance`] if there are no more
/// observations than dimensions or the sample covariance is not positive
/// definite, and [`DetectionError::MissingReferenceData`] if `current` has
/// the wrong length.
#[allow(clippy::cast_precision_loss)]
pub fn t2_step(
    history: &[Vec<f64>],
    current: &[f64],
    alpha: f64,
) -> Result<T2Result, DetectionError> {
    let p = current.len();
    let n = history.len();
    if n <= p {
        return Err(DetectionError::SingularCovariance {
            observations: n,
            dimensions: p,
        });
    }
    if let Some(row) = history.iter().find(|row| row.len() != p) {
        return Err(DetectionError::missing(format!(
            "baseline row has {} states but the current observation has {p}",
            row.len()
        )));
    }

    let mean = linalg::mean(history, p);
    let cov = linalg::covariance(history, &mean);
    let Some(factor) = linalg::cholesky(&cov) else {
        return Err(DetectionError::SingularCovariance {
            observations: n,
            dimensions: p,
        });
    };

    let deviation: Vec<f64> = current.iter().zip(&mean).map(|(x, m)| x - m).collect();
    let t2 = linalg::quadratic_form(&factor, &deviation);

    let (pf, nf) = (p as f64, n as f64);
    let scaled = t2 * (nf - pf) / (pf * (nf - 1.0));

    Ok(T2Result {
        t2,
        critical_value: critical_value(p, n, alpha)?,
        p_value: fdist::upper_tail(scaled, pf, nf - pf)?,
        observations: n,
    })
}

/// Evaluates every surveillance period of the state matrix.
///
/// # Errors
///
/// Returns [`DetectionError::InvalidConfiguration`] if the configuration
/// is malformed or the requested periods lie outside the matrix.
pub fn run(
    matrix: &StateMatrix,
    config: &HotellingConfig,
    progress: &dyn ProgressCallback,
) -> Result<Vec<StepRecord<T2Result>>, DetectionError> {
    config.validate()?;

    let start = matrix.first_period() + config.start_offset;
    let end = config.end.unwrap_or_else(|| matrix.last_period());
    if end > matrix.last_period() || start > end {
        return Err(DetectionError::invalid(format!(
            "hotelling periods {start}..={end} are outside {}..={}",
            matrix.first_period(),
            matrix.last_period()
        )));
    }

    log::info!(
        "Hotelling T² over {} states for periods {start}..={end} (alpha = {})",
        matrix.dimensions(),
        config.alpha
    );
    progress.set_total(u64::from(end - start + 1));

    let mut records = Vec::new();
    for period in start..=end {
        let result = matrix
            .observation(period)
            .ok_or_else(|| DetectionError::missing(format!("no state counts for period {period}")))
            .and_then(|current| t2_step(matrix.history_before(period), current, config.alpha));

        match &result {
            Ok(r) if r.is_alarm() => log::info!(
                "Period {period}: T² = {:.3} exceeds {:.3} (p = {:.4})",
                r.t2,
                r.critical_value,
                r.p_value
            ),
            Ok(_) => {}
            Err(err) => log::debug!("Period {period}: {err}"),
        }

        records.push(StepRecord::from_result(period, result));
        progress.inc(1);
    }

    let alarms = records
        .iter()
        .filter_map(StepRecord::result)
        .filter(|r| r.is_alarm())
        .count();
    progress.finish(format!("Evaluated {} periods, {alarms} alarms", records.len()));

    Ok(records)
}

#[cfg(test)]
mod tests {
    use outbreak_models::FailureKind;
    use outbreak_models::progress::NullProgress;

    use super::*;

    fn outlier_matrix() -> StateMatrix {
        StateMatrix::from_rows(
            vec!["01".to_string(), "02".to_string(), "03".to_string()],
            1,
            vec![
                vec![10.0, 20.0, 30.0],
                vec![12.0, 18.0, 31.0],
                vec![11.0, 23.0, 29.0],
                vec![9.0, 19.0, 33.0],
                vec![40.0, 60.0, 80.0],
                vec![11.0, 21.0, 30.0],
            ],
        )
    }

    #[test]
    fn outlier_month_crosses_control_limit() {
        let records = run(&outlier_matrix(), &HotellingConfig::default(), &NullProgress).unwrap();
        assert_eq!(records.len(), 6);

        for record in &records[..4] {
            assert_eq!(record.failure().unwrap().kind, FailureKind::SingularCovariance);
        }

        let month5 = records[4].result().unwrap();
        assert_eq!(month5.observations, 4);
        assert!(month5.is_alarm());
        assert!((month5.t2 - 15_797.37).abs() < 0.1);
        assert!((month5.critical_value - 1_941.37).abs() < 0.1);
        assert!(month5.p_value < 0.05);

        let month6 = records[5].result().unwrap();
        assert!(!month6.is_alarm());
        assert!((month6.t2 - 0.577).abs() < 1e-2);
        assert!(month6.t2 >= 0.0);
    }

    #[test]
    fn critical_value_decreases_with_history() {
        let values: Vec<f64> = (4..30)
            .step_by(5)
            .map(|n| critical_value(3, n, 0.05).unwrap())
            .collect();
        assert!(values.windows(2).all(|w| w[1] < w[0]), "{values:?}");
        assert!((values[1] - 19.03).abs() < 0.01);
    }

    #[test]
    fn too_little_history_is_singular() {
        let history = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        let err = t2_step(&history, &[1.0, 1.0], 0.05).unwrap_err();
        assert_eq!(
            err,
            DetectionError::SingularCovariance {
                observations: 2,
                dimensions: 2
            }
        );
    }

    #[test]
    fn collinear_history_is_singular() {
        let history = vec![
            vec![1.0, 2.0],
            vec![2.0, 4.0],
            vec![3.0, 6.0],
            vec![4.0, 8.0],
        ];
        assert!(matches!(
            t2_step(&history, &[1.0, 1.0], 0.05),
            Err(DetectionError::SingularCovariance { .. })
        ));
    }

    #[test]
    fn t2_is_zero_at_the_mean() {
        let history = vec![
            vec![1.0, 5.0],
            vec![3.0, 4.0],
            vec![2.0, 7.0],
            vec![6.0, 4.0],
        ];
        let result = t2_step(&history, &[3.0, 5.0], 0.05).unwrap();
        assert!(result.t2.abs() < 1e-12);
        assert!((result.p_value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn start_offset_and_end_bound_the_run() {
        let config = HotellingConfig {
            start_offset: 4,
            end: Some(5),
            ..HotellingConfig::default()
        };
        let records = run(&outlier_matrix(), &config, &NullProgress).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].period, 5);

        let config = HotellingConfig {
            end: Some(9),
            ..HotellingConfig::default()
        };
        assert!(run(&outlier_matrix(), &config, &NullProgress).is_err());
    }
}
