//! Analysis stages shared by the subcommands and the interactive menu.

use std::time::Instant;

use outbreak_aggregate::{
    CountMatrix, StateMatrix, aggregate_district_periods, aggregate_state_periods,
};
use outbreak_cli_utils::{IndicatifProgress, MultiProgress};
use outbreak_ingest::{AnalysisConfig, Dataset};
use outbreak_models::results::StepRecord;
use outbreak_models::{DistrictPeriod, StatePeriod};
use outbreak_report::{ReportWriter, ZoneLabels};
use outbreak_scan::ScanEngine;

/// What to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Aggregate,
    Scan,
    Hotelling,
    Stcd,
    All,
}

impl Stage {
    pub const ALL: &[Self] = &[
        Self::All,
        Self::Aggregate,
        Self::Scan,
        Self::Hotelling,
        Self::Stcd,
    ];

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::All => "Run every detector",
            Self::Aggregate => "Aggregate monthly counts",
            Self::Scan => "Space-time scan (frequentist + Bayesian)",
            Self::Hotelling => "Hotelling T² control chart",
            Self::Stcd => "Space-time cluster detection on cases",
        }
    }
}

/// Loaded inputs, aggregated tables, and the report destination.
pub struct Session {
    config: AnalysisConfig,
    dataset: Dataset,
    district_rows: Vec<DistrictPeriod>,
    state_rows: Vec<StatePeriod>,
    report: ReportWriter,
}

impl Session {
    /// Validates the configuration, loads the inputs, and aggregates the
    /// configured case type.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, an input cannot
    /// be read, aggregation fails, or the output directory cannot be
    /// created.
    pub fn open(
        config: AnalysisConfig,
        multi: &MultiProgress,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let spinner = IndicatifProgress::stage_spinner(multi, "Loading inputs");
        let dataset = outbreak_ingest::load_dataset(&config.data)?;
        let events = dataset.events_of_type(config.data.case_type.as_deref());
        let district_rows =
            aggregate_district_periods(&events, &dataset.grid, &dataset.calendar)?;
        let state_rows = aggregate_state_periods(&district_rows)?;
        spinner.finish(format!(
            "Loaded {} cases ({} counted) into {} district-periods",
            dataset.events.len(),
            events.len(),
            district_rows.len()
        ));

        let report = ReportWriter::create(&config.output.dir, dataset.calendar)?;

        Ok(Self {
            config,
            dataset,
            district_rows,
            state_rows,
            report,
        })
    }

    /// Runs a stage and writes its report files.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage cannot start or a report cannot be
    /// written. Per-period failures are recorded in the reports instead.
    pub fn run(
        &self,
        stage: Stage,
        multi: &MultiProgress,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let start = Instant::now();
        match stage {
            Stage::Aggregate => self.aggregate()?,
            Stage::Scan => self.scan(multi)?,
            Stage::Hotelling => self.hotelling(multi)?,
            Stage::Stcd => self.stcd(multi)?,
            Stage::All => {
                self.aggregate()?;
                self.hotelling(multi)?;
                self.scan(multi)?;
                self.stcd(multi)?;
            }
        }
        log::info!(
            "Finished in {:.1}s; reports in {}",
            start.elapsed().as_secs_f64(),
            self.report.dir().display()
        );
        Ok(())
    }

    fn aggregate(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.report.write_district_periods(&self.district_rows)?;
        self.report.write_state_periods(&self.state_rows)?;
        Ok(())
    }

    fn scan(&self, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
        let grid = &self.dataset.grid;
        let matrix = CountMatrix::from_district_periods(grid, &self.district_rows)?;
        let catalog = self.dataset.zone_catalog(&self.config.data)?;
        let engine = ScanEngine::new(
            &matrix,
            &catalog,
            self.config.scan.clone(),
            self.config.bayes.clone(),
        )?;

        let progress = IndicatifProgress::steps_bar(multi, "Scanning");
        let run = engine.run(progress.as_ref())?;

        let failures = run.scan.iter().filter(|r| r.failure().is_some()).count();
        if failures > 0 {
            log::warn!("{failures} scan periods failed; see the failure column");
        }

        let labels = ZoneLabels::new(&catalog, grid);
        self.report.write_scan(&run.scan, &labels)?;
        self.report
            .write_bayes(&run.bayes, &labels, &self.config.bayes.relrisk.values())?;
        Ok(())
    }

    fn hotelling(&self, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
        let matrix = StateMatrix::from_state_periods(&self.state_rows)?;
        let progress = IndicatifProgress::steps_bar(multi, "Hotelling T²");
        let records = outbreak_hotelling::run(&matrix, &self.config.hotelling, progress.as_ref())?;

        if let Some(first) = records
            .iter()
            .find(|r| r.result().is_some_and(|t2| t2.is_alarm()))
        {
            log::info!(
                "First T² alarm in {}",
                self.dataset.calendar.period_label(first.period)
            );
        }
        let completed = records.iter().filter_map(StepRecord::result).count();
        log::debug!("{completed} of {} T² periods completed", records.len());

        self.report.write_hotelling(&records)?;
        Ok(())
    }

    fn stcd(&self, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
        let config = &self.config.stcd;
        let events = outbreak_stcd::prepare_events(
            &self.dataset.events,
            config.case_type.as_deref(),
            (config.day_start, config.day_end),
        );

        let spinner = IndicatifProgress::stage_spinner(
            multi,
            &format!("Space-time cluster detection over {} cases", events.len()),
        );
        let outcome = outbreak_stcd::detect(&events, config)?;
        match &outcome.alarm {
            Some(alarm) => spinner.finish(format!(
                "Cluster alarm on {} (onset {})",
                self.dataset
                    .calendar
                    .date_of(alarm.alarm_day)
                    .map_or_else(|| alarm.alarm_day.to_string(), |d| d.to_string()),
                self.dataset
                    .calendar
                    .date_of(alarm.onset_day)
                    .map_or_else(|| alarm.onset_day.to_string(), |d| d.to_string()),
            )),
            None => spinner.finish("No space-time cluster alarm".to_string()),
        }

        self.report.write_stcd(&events, config, &outcome)?;
        Ok(())
    }
}
