#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Space-time cluster detection over individual case events.
//!
//! Implements the Assunção–Correa prospective surveillance statistic. Every
//! event `k` opens a candidate cluster: the circle of radius `r` around
//! it, from its own time onwards. After event `n` arrives, the cluster
//! opened by `k` has likelihood ratio
//!
//! ```text
//! Λ(k, n) = (1 + ε)^N(k, n) · exp(−ε · μ(k, n))
//! ```
//!
//! where `N(k, n)` counts events `k..=n` inside the circle and
//! `μ(k, n) = N(circle, 1..=n) · (n − k + 1) / n` is its expectation if
//! space and time were independent. The surveillance statistic is
//! `R(n) = Σ_k Λ(k, n)` (Shiryaev–Roberts) or `max_k Λ(k, n)` (CUSUM), and
//! the first `n` with `R(n) > threshold` raises the alarm.
//!
//! Neighbourhoods come from an R-tree, so each new event only updates the
//! clusters whose circle it falls into.

use outbreak_models::results::ClusterAlarm;
use outbreak_models::{CaseEvent, DetectionError};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

/// `[stcd]` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StcdConfig {
    /// Case type to monitor; `None` keeps every type.
    pub case_type: Option<String>,
    /// First day index to include.
    pub day_start: Option<f64>,
    /// Last day index to include.
    pub day_end: Option<f64>,
    /// Cluster radius in coordinate units.
    pub radius: f64,
    /// Relative risk increase `ε` inside a cluster.
    pub epsilon: f64,
    /// Alarm threshold for the statistic.
    pub threshold: f64,
    /// Use `max_k` instead of `Σ_k`.
    pub cusum: bool,
}

impl Default for StcdConfig {
    fn default() -> Self {
        Self {
            case_type: None,
            day_start: None,
            day_end: None,
            radius: 1_000.0,
            epsilon: 0.5,
            threshold: 1_000.0,
            cusum: false,
        }
    }
}

impl StcdConfig {
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if the radius,
    /// `ε`, or threshold is not positive and finite, or the day range is
    /// empty.
    pub fn validate(&self) -> Result<(), DetectionError> {
        for (name, value) in [
            ("radius", self.radius),
            ("epsilon", self.epsilon),
            ("threshold", self.threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DetectionError::invalid(format!(
                    "stcd {name} must be positive, got {value}"
                )));
            }
        }
        if let (Some(start), Some(end)) = (self.day_start, self.day_end)
            && start > end
        {
            return Err(DetectionError::invalid(format!(
                "stcd day range {start}..={end} is empty"
            )));
        }
        Ok(())
    }
}

/// Statistic path and the alarm, if one was raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StcdOutcome {
    /// `R(n)` for every event up to and including the alarm.
    pub statistic: Vec<f64>,
    /// The first threshold crossing.
    pub alarm: Option<ClusterAlarm>,
}

/// Keeps events of one case type within an inclusive day range, ordered
/// by time then ID.
#[must_use]
pub fn prepare_events(
    events: &[CaseEvent],
    case_type: Option<&str>,
    day_range: (Option<f64>, Option<f64>),
) -> Vec<CaseEvent> {
    let (start, end) = day_range;
    let mut kept: Vec<CaseEvent> = events
        .iter()
        .filter(|e| case_type.is_none_or(|t| e.case_type == t))
        .filter(|e| start.is_none_or(|s| e.time >= s) && end.is_none_or(|x| e.time <= x))
        .cloned()
        .collect();
    kept.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.id.cmp(&b.id)));

    log::debug!(
        "Kept {} of {} events for space-time cluster detection",
        kept.len(),
        events.len()
    );
    kept
}

type EventEntry = GeomWithData<[f64; 2], usize>;

/// Runs the detector over events already in time order (see
/// [`prepare_events`]). Stops at the first alarm.
///
/// # Errors
///
/// Returns [`DetectionError::InvalidConfiguration`] if the configuration
/// is invalid, and [`DetectionError::MissingReferenceData`] if an event has
/// a non-finite location.
#[allow(clippy::cast_precision_loss)]
pub fn detect(events: &[CaseEvent], config: &StcdConfig) -> Result<StcdOutcome, DetectionError> {
    config.validate()?;
    if let Some(event) = events.iter().find(|e| !e.x.is_finite() || !e.y.is_finite()) {
        return Err(DetectionError::missing(format!(
            "case {} has no usable location",
            event.id
        )));
    }

    let tree: RTree<EventEntry> = RTree::bulk_load(
        events
            .iter()
            .enumerate()
            .map(|(i, e)| EventEntry::new([e.x, e.y], i))
            .collect(),
    );
    let radius_2 = config.radius * config.radius;
    let log_growth = config.epsilon.ln_1p();
    let log_threshold = config.threshold.ln();

    // Events k..=n inside circle k.
    let mut inside = vec![0_u64; events.len()];
    // Events 0..=n inside circle k.
    let mut circle_total = vec![0_u64; events.len()];
    let mut statistic = Vec::with_capacity(events.len());
    let mut log_lambda = Vec::with_capacity(events.len());

    for (n, event) in events.iter().enumerate() {
        for entry in tree.locate_within_distance([event.x, event.y], radius_2) {
            let j = entry.data;
            if j > n {
                continue;
            }
            circle_total[n] += 1;
            if j < n {
                circle_total[j] += 1;
                inside[j] += 1;
            }
        }
        inside[n] = 1;

        let seen = (n + 1) as f64;
        log_lambda.clear();
        log_lambda.extend((0..=n).map(|k| {
            let expected = circle_total[k] as f64 * (n - k + 1) as f64 / seen;
            (inside[k] as f64).mul_add(log_growth, -config.epsilon * expected)
        }));

        let log_r = if config.cusum {
            log_lambda.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        } else {
            log_sum_exp(&log_lambda)
        };
        statistic.push(log_r.exp());

        if log_r > log_threshold {
            let mut onset = 0;
            for (k, &value) in log_lambda.iter().enumerate() {
                if value > log_lambda[onset] {
                    onset = k;
                }
            }
            let origin = &events[onset];
            let alarm = ClusterAlarm {
                alarm_index: n,
                onset_index: onset,
                alarm_day: event.time,
                onset_day: origin.time,
                x: origin.x,
                y: origin.y,
                radius: config.radius,
                statistic: log_r.exp(),
            };
            log::info!(
                "Space-time cluster alarm at event {n} (day {:.1}), onset event {onset} (day {:.1}) at ({:.1}, {:.1})",
                alarm.alarm_day,
                alarm.onset_day,
                alarm.x,
                alarm.y
            );
            return Ok(StcdOutcome {
                statistic,
                alarm: Some(alarm),
            });
        }
    }

    log::info!("No space-time cluster alarm over {} events", events.len());
    Ok(StcdOutcome {
        statistic,
        alarm: None,
    })
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}
