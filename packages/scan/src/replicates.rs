//! Monte Carlo replicate pool, empirical p-values and critical values.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How the replicate pool evolves across surveillance steps.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReplicatePolicy {
    /// Replicates from every step so far form one growing reference set.
    #[default]
    Accumulate,
    /// Each step is compared only against its own replicates.
    PerStep,
}

/// Append-only, ordered sequence of replicate maximum scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicatePool {
    scores: Vec<f64>,
}

impl ReplicatePool {
    /// An empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self { scores: Vec::new() }
    }

    /// A pool seeded with existing scores, e.g. injected by a test harness.
    #[must_use]
    pub const fn from_scores(scores: Vec<f64>) -> Self {
        Self { scores }
    }

    /// Appends scores in order.
    pub fn extend(&mut self, scores: impl IntoIterator<Item = f64>) {
        self.scores.extend(scores);
    }

    /// Number of replicates in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the pool holds no replicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Scores in insertion order.
    #[must_use]
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Empirical p-value `(1 + #{r ≥ observed}) / (1 + N)`.
    ///
    /// Always in `(0, 1]`; equals `1 / (1 + N)` when the observed score
    /// beats every replicate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn p_value(&self, observed: f64) -> f64 {
        let at_least = self.scores.iter().filter(|&&r| r >= observed).count();
        (1 + at_least) as f64 / (1 + self.scores.len()) as f64
    }

    /// Hyndman–Fan type-8 sample quantile (approximately median-unbiased),
    /// or `None` for an empty pool.
    #[must_use]
    pub fn quantile(&self, prob: f64) -> Option<f64> {
        quantile_type8(&self.scores, prob)
    }
}

/// Hyndman–Fan type-8 quantile of `values` at `prob ∈ [0, 1]`.
///
/// With sorted `x₁ ≤ … ≤ xₙ`, `h = 1/3 + prob·(n + 1/3)`, `j = ⌊h⌋`:
/// `Q = x_j + (h − j)(x_{j+1} − x_j)`, clamped to `[x₁, xₙ]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn quantile_type8(values: &[f64], prob: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&prob) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let fuzz = 4.0 * f64::EPSILON;
    let h = (1.0 / 3.0) + prob * (n as f64 + 1.0 / 3.0);
    let j = (h + fuzz).floor();
    let mut g = h - j;
    if g.abs() < fuzz {
        g = 0.0;
    }

    // 1-based order statistic, clamped to the sample.
    let at = |k: f64| sorted[(k.max(1.0) as usize).min(n) - 1];
    let lo = at(j);
    let hi = at(j + 1.0);

    Some(if g == 0.0 { lo } else { (1.0 - g).mul_add(lo, g * hi) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_to_ten() -> Vec<f64> {
        (1..=10).map(f64::from).collect()
    }

    #[test]
    fn type8_matches_reference_values() {
        let x = one_to_ten();
        assert!((quantile_type8(&x, 0.5).unwrap() - 5.5).abs() < 1e-12);
        assert!((quantile_type8(&x, 0.9).unwrap() - 9.633_333_333_333_333).abs() < 1e-9);
        assert!((quantile_type8(&x, 0.95).unwrap() - 10.0).abs() < 1e-12);
        assert!((quantile_type8(&x, 0.0).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn type8_ignores_input_order() {
        let mut x = one_to_ten();
        x.reverse();
        assert!((quantile_type8(&x, 0.5).unwrap() - 5.5).abs() < 1e-12);
    }

    #[test]
    fn type8_rejects_empty_and_out_of_range() {
        assert_eq!(quantile_type8(&[], 0.5), None);
        assert_eq!(quantile_type8(&[1.0], 1.5), None);
    }

    #[test]
    fn p_value_best_case_is_one_over_n_plus_one() {
        let pool = ReplicatePool::from_scores(one_to_ten());
        assert!((pool.p_value(11.0) - 1.0 / 11.0).abs() < 1e-15);
    }

    #[test]
    fn p_value_counts_ties_as_extreme() {
        let pool = ReplicatePool::from_scores(one_to_ten());
        // 10 and 9 are >= 9.
        assert!((pool.p_value(9.0) - 3.0 / 11.0).abs() < 1e-15);
        assert!((pool.p_value(0.0) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn p_value_is_in_unit_interval() {
        let pool = ReplicatePool::from_scores(vec![0.0, 3.5, 3.5, 7.0]);
        for observed in [-1.0, 0.0, 3.5, 5.0, 100.0] {
            let p = pool.p_value(observed);
            assert!(p > 0.0 && p <= 1.0, "p = {p}");
        }
        assert!((ReplicatePool::new().p_value(1.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn p_value_shrinks_as_pool_grows_with_fixed_rank() {
        let observed = 5.0;
        let mut pool = ReplicatePool::from_scores(vec![6.0]);
        let mut previous = pool.p_value(observed);
        for _ in 0..20 {
            pool.extend([1.0, 2.0]);
            let p = pool.p_value(observed);
            assert!(p <= previous);
            previous = p;
        }
        assert!((previous - 2.0 / 42.0).abs() < 1e-15);
    }

    #[test]
    fn policy_strings() {
        assert_eq!(ReplicatePolicy::PerStep.to_string(), "per_step");
        assert_eq!(
            "accumulate".parse::<ReplicatePolicy>().unwrap(),
            ReplicatePolicy::Accumulate
        );
    }
}
