#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sliding-window space-time scan engine.
//!
//! For every surveillance period the engine looks back over a bounded
//! window of monthly district counts and evaluates two statistics over
//! every (zone, duration) cylinder of the [`ZoneCatalog`]:
//!
//! - Kulldorff's Poisson likelihood ratio, with significance from Monte
//!   Carlo null replicates collected in a [`ReplicatePool`];
//! - a Bayesian scan whose relative-risk posterior for the most likely
//!   cluster is carried forward as the next period's prior.
//!
//! All cross-step state lives in [`ScanState`], which is passed into and
//! returned from [`ScanEngine::step`].

pub mod bayes;
pub mod config;
pub mod poisson;
pub mod replicates;
pub mod window;

use std::ops::RangeInclusive;

use outbreak_aggregate::CountMatrix;
use outbreak_models::DetectionError;
use outbreak_models::progress::ProgressCallback;
use outbreak_models::results::{BayesScanResult, ScanResult, StepRecord};
use outbreak_zones::ZoneCatalog;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub use bayes::{RelRiskGrid, RelRiskPrior};
pub use config::{BayesConfig, DEFAULT_SEED, ScanConfig};
pub use replicates::{ReplicatePolicy, ReplicatePool};
pub use window::{Cylinder, ObservationWindow};

/// State threaded from one surveillance step to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanState {
    /// Prior over the relative-risk grid for the Bayesian scan.
    pub relrisk_prior: RelRiskPrior,
    /// Maximum scores of every null replicate so far.
    pub replicates: ReplicatePool,
}

impl ScanState {
    /// Uniform relative-risk prior and an empty replicate pool.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if the
    /// relative-risk grid is malformed.
    pub fn initial(bayes: &BayesConfig) -> Result<Self, DetectionError> {
        Ok(Self {
            relrisk_prior: RelRiskPrior::uniform(&bayes.relrisk)?,
            replicates: ReplicatePool::new(),
        })
    }
}

/// Both engines' records for one period.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub scan: StepRecord<ScanResult>,
    pub bayes: StepRecord<BayesScanResult>,
}

/// Records for every surveillance period plus the final state.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRun {
    pub scan: Vec<StepRecord<ScanResult>>,
    pub bayes: Vec<StepRecord<BayesScanResult>>,
    pub final_state: ScanState,
}

/// Runs the frequentist and Bayesian scans over a count matrix.
pub struct ScanEngine<'a> {
    matrix: &'a CountMatrix,
    catalog: &'a ZoneCatalog,
    config: ScanConfig,
    bayes: BayesConfig,
    periods: RangeInclusive<u32>,
}

impl<'a> ScanEngine<'a> {
    /// Validates the configuration against the data.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if either config
    /// is malformed, the window is longer than the available history, the
    /// surveillance range falls outside the matrix, or the catalog indexes
    /// a different number of districts than the matrix holds.
    pub fn new(
        matrix: &'a CountMatrix,
        catalog: &'a ZoneCatalog,
        config: ScanConfig,
        bayes: BayesConfig,
    ) -> Result<Self, DetectionError> {
        config.validate()?;
        bayes.validate()?;

        if config.window > matrix.period_count() {
            return Err(DetectionError::invalid(format!(
                "scan window of {} periods is longer than the {} periods of history",
                config.window,
                matrix.period_count()
            )));
        }
        if catalog.district_count() != matrix.district_count() {
            return Err(DetectionError::invalid(format!(
                "zone catalog covers {} districts but the count matrix has {}",
                catalog.district_count(),
                matrix.district_count()
            )));
        }

        #[allow(clippy::cast_possible_truncation)]
        let full_window = matrix.first_period() + config.window as u32 - 1;
        let start = config.start.unwrap_or(full_window);
        let end = config.end.unwrap_or_else(|| matrix.last_period());
        if start < matrix.first_period() || end > matrix.last_period() || start > end {
            return Err(DetectionError::invalid(format!(
                "scan periods {start}..={end} are outside {}..={}",
                matrix.first_period(),
                matrix.last_period()
            )));
        }

        Ok(Self {
            matrix,
            catalog,
            config,
            bayes,
            periods: start..=end,
        })
    }

    /// Surveillance periods, in order.
    #[must_use]
    pub const fn periods(&self) -> &RangeInclusive<u32> {
        &self.periods
    }

    /// The frequentist settings.
    #[must_use]
    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// The random source for a run: the configured seed, or OS entropy.
    #[must_use]
    pub fn rng(&self) -> StdRng {
        self.config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
    }

    /// Runs one surveillance step.
    ///
    /// Each statistic that fails leaves its part of the state untouched
    /// and records the failure instead of a result.
    pub fn step<R: Rng + ?Sized>(
        &self,
        period: u32,
        state: ScanState,
        rng: &mut R,
    ) -> (StepOutput, ScanState) {
        let window = match ObservationWindow::ending_at(self.matrix, period, self.config.window) {
            Ok(window) => window,
            Err(err) => {
                log::warn!("Scan step {period} failed: {err}");
                let output = StepOutput {
                    scan: StepRecord::from_result(period, Err(err.clone())),
                    bayes: StepRecord::from_result(period, Err(err)),
                };
                return (output, state);
            }
        };
        let cylinders = window.cylinders(self.catalog);
        let ScanState {
            relrisk_prior,
            replicates,
        } = state;

        let (scan, replicates) = match self.frequentist(&window, &cylinders, &replicates, rng) {
            Ok((result, pool)) => (Ok(result), pool),
            Err(err) => (Err(err), replicates),
        };
        let (bayes, relrisk_prior) =
            match bayes::bayes_scan(&window, self.catalog, &relrisk_prior, &self.bayes) {
                Ok((result, next)) => (Ok(result), next),
                Err(err) => (Err(err), relrisk_prior),
            };

        if let Err(err) = &scan {
            log::warn!("Frequentist scan for period {period} failed: {err}");
        }
        if let Err(err) = &bayes {
            log::warn!("Bayesian scan for period {period} failed: {err}");
        }

        let output = StepOutput {
            scan: StepRecord::from_result(period, scan),
            bayes: StepRecord::from_result(period, bayes),
        };
        (
            output,
            ScanState {
                relrisk_prior,
                replicates,
            },
        )
    }

    #[allow(clippy::cast_precision_loss)]
    fn frequentist<R: Rng + ?Sized>(
        &self,
        window: &ObservationWindow,
        cylinders: &[Cylinder],
        pool: &ReplicatePool,
        rng: &mut R,
    ) -> Result<(ScanResult, ReplicatePool), DetectionError> {
        let total = window.total() as f64;
        let Some(mlc) = poisson::most_likely_cluster(cylinders, total) else {
            return Err(DetectionError::degenerate(format!(
                "every cylinder in periods {}..={} has zero expected count",
                window.first(),
                window.last()
            )));
        };

        let step_scores = (0..self.config.n_mc).map(|_| {
            let replicate = window.with_counts(poisson::simulate_null(window, &mut *rng));
            let replicate_cylinders = replicate.cylinders(self.catalog);
            poisson::replicate_max_score(&replicate, &replicate_cylinders)
        });
        let pool = match self.config.replicate_policy {
            ReplicatePolicy::Accumulate => {
                let mut pool = pool.clone();
                pool.extend(step_scores);
                pool
            }
            ReplicatePolicy::PerStep => ReplicatePool::from_scores(step_scores.collect()),
        };

        let Some(critical_value) = pool.quantile(1.0 - self.config.alpha) else {
            return Err(DetectionError::invalid("replicate pool is empty"));
        };

        let result = ScanResult {
            observed_score: mlc.score,
            critical_value,
            p_value: pool.p_value(mlc.score),
            zone: mlc.cylinder.zone,
            duration: mlc.cylinder.duration,
            relative_risk_inside: mlc.relative_risk_inside(),
            relative_risk_outside: mlc.relative_risk_outside(total),
            replicates: pool.len(),
        };
        Ok((result, pool))
    }

    /// Runs every surveillance period from the initial state with the
    /// configured random source.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if the initial
    /// state cannot be built.
    pub fn run(&self, progress: &dyn ProgressCallback) -> Result<ScanRun, DetectionError> {
        let state = ScanState::initial(&self.bayes)?;
        let mut rng = self.rng();
        Ok(self.run_from(state, &mut rng, progress))
    }

    /// Runs every surveillance period from an explicit state.
    pub fn run_from<R: Rng + ?Sized>(
        &self,
        mut state: ScanState,
        rng: &mut R,
        progress: &dyn ProgressCallback,
    ) -> ScanRun {
        let periods = self.periods.clone();
        let steps = periods.clone().count();
        log::info!(
            "Scanning periods {}..={} over {} zones (window {}, {} replicates per step, {} pool)",
            periods.start(),
            periods.end(),
            self.catalog.len(),
            self.config.window,
            self.config.n_mc,
            self.config.replicate_policy
        );
        progress.set_total(steps as u64);

        let mut scan = Vec::with_capacity(steps);
        let mut bayes = Vec::with_capacity(steps);

        for period in periods {
            progress.set_message(format!("period {period}"));
            let (output, next) = self.step(period, state, rng);
            state = next;
            scan.push(output.scan);
            bayes.push(output.bayes);
            progress.inc(1);
        }

        let alarms = scan
            .iter()
            .filter_map(StepRecord::result)
            .filter(|r| r.observed_score > r.critical_value)
            .count();
        progress.finish(format!("Scanned {steps} periods, {alarms} above the critical value"));

        ScanRun {
            scan,
            bayes,
            final_state: state,
        }
    }
}
