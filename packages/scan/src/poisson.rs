//! Kulldorff's population-based Poisson scan statistic.

use rand::Rng;
use rand_distr::{Binomial, Distribution};

use crate::window::{Cylinder, ObservationWindow};

/// The highest-scoring cylinder of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mlc {
    pub cylinder: Cylinder,
    pub score: f64,
}

impl Mlc {
    /// Observed over expected inside the cluster.
    #[must_use]
    pub fn relative_risk_inside(&self) -> f64 {
        self.cylinder.observed / self.cylinder.expected
    }

    /// Observed over expected outside the cluster; `None` if nothing is
    /// expected outside it.
    #[must_use]
    pub fn relative_risk_outside(&self, total: f64) -> Option<f64> {
        let expected = total - self.cylinder.expected;
        (expected > 0.0).then(|| (total - self.cylinder.observed) / expected)
    }
}

/// Log-likelihood ratio of a cylinder against the constant-risk null.
///
/// Returns `None` for a degenerate cylinder (nothing expected inside) and
/// `Some(0.0)` when the cylinder does not show excess risk.
#[must_use]
pub fn kulldorff_score(observed: f64, expected: f64, total: f64) -> Option<f64> {
    if expected <= 0.0 || expected.is_nan() {
        return None;
    }
    if observed <= expected {
        return Some(0.0);
    }

    let outside = total - observed;
    let expected_outside = total - expected;
    let inside_term = observed * (observed / expected).ln();
    let outside_term = if outside > 0.0 && expected_outside > 0.0 {
        outside * (outside / expected_outside).ln()
    } else {
        0.0
    };

    Some(inside_term + outside_term)
}

/// The cylinder with the highest score.
///
/// Cylinders are visited in catalog order (zone, then duration) and a later
/// cylinder only replaces the current best on a strictly higher score, so
/// ties go to the smaller zone index and then the shorter duration.
/// Returns `None` if every cylinder is degenerate.
#[must_use]
pub fn most_likely_cluster(cylinders: &[Cylinder], total: f64) -> Option<Mlc> {
    let mut best: Option<Mlc> = None;

    for cylinder in cylinders {
        let Some(score) = kulldorff_score(cylinder.observed, cylinder.expected, total) else {
            continue;
        };
        if best.is_none_or(|b| score > b.score) {
            best = Some(Mlc {
                cylinder: *cylinder,
                score,
            });
        }
    }

    best
}

/// Redistributes the window total over its cells under the null.
///
/// Draws a multinomial with cell probabilities `μ / C` as a chain of
/// conditional binomials so the replicate total always equals the
/// observed total.
#[allow(clippy::cast_precision_loss)]
pub fn simulate_null<R: Rng + ?Sized>(window: &ObservationWindow, rng: &mut R) -> Vec<Vec<u64>> {
    let mut remaining = window.total();
    let mut mass_left: f64 = window.expected().iter().flatten().sum();

    window
        .expected()
        .iter()
        .map(|row| {
            row.iter()
                .map(|&mu| {
                    let draw = if remaining == 0 || mass_left <= 0.0 {
                        0
                    } else if mass_left - mu <= mass_left * 1e-12 {
                        // Last cell with mass takes whatever is left.
                        remaining
                    } else {
                        let p = (mu / mass_left).clamp(0.0, 1.0);
                        Binomial::new(remaining, p).map_or(0, |b| b.sample(rng))
                    };
                    remaining -= draw;
                    mass_left -= mu;
                    draw
                })
                .collect()
        })
        .collect()
}

/// Maximum score over all cylinders of one null replicate, or zero if the
/// replicate has no scorable cylinder.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn replicate_max_score(replicate: &ObservationWindow, cylinders: &[Cylinder]) -> f64 {
    most_likely_cluster(cylinders, replicate.total() as f64).map_or(0.0, |mlc| mlc.score)
}
