//! Flat CSV rows, one per surveillance step.
//!
//! Failed steps keep their period and month columns and leave every
//! numeric column empty; `failure` holds the error kind and
//! `failure_message` its text.

use outbreak_models::results::{BayesScanResult, ScanResult, StepOutcome, StepRecord, T2Result};
use outbreak_models::{FailureKind, PeriodCalendar};
use serde::Serialize;

use crate::ZoneLabels;

fn split<T>(record: &StepRecord<T>) -> (Option<&T>, Option<FailureKind>, Option<String>) {
    match &record.outcome {
        StepOutcome::Completed(value) => (Some(value), None, None),
        StepOutcome::Failed(failure) => (None, Some(failure.kind), Some(failure.message.clone())),
    }
}

/// `scan.csv` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRow {
    pub period: u32,
    pub month: String,
    pub observed_score: Option<f64>,
    pub critical_value: Option<f64>,
    pub p_value: Option<f64>,
    pub alarm: Option<bool>,
    pub zone: Option<usize>,
    pub zone_districts: Option<String>,
    pub duration: Option<usize>,
    pub relative_risk_inside: Option<f64>,
    pub relative_risk_outside: Option<f64>,
    pub replicates: Option<usize>,
    pub failure: Option<FailureKind>,
    pub failure_message: Option<String>,
}

impl ScanRow {
    #[must_use]
    pub fn new(
        record: &StepRecord<ScanResult>,
        calendar: &PeriodCalendar,
        zones: &ZoneLabels,
    ) -> Self {
        let (result, failure, failure_message) = split(record);
        Self {
            period: record.period,
            month: calendar.period_label(record.period),
            observed_score: result.map(|r| r.observed_score),
            critical_value: result.map(|r| r.critical_value),
            p_value: result.map(|r| r.p_value),
            alarm: result.map(|r| r.observed_score > r.critical_value),
            zone: result.map(|r| r.zone),
            zone_districts: result.and_then(|r| zones.get(r.zone)).map(str::to_string),
            duration: result.map(|r| r.duration),
            relative_risk_inside: result.map(|r| r.relative_risk_inside),
            relative_risk_outside: result.and_then(|r| r.relative_risk_outside),
            replicates: result.map(|r| r.replicates),
            failure,
            failure_message,
        }
    }
}

/// `bayes.csv` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BayesRow {
    pub period: u32,
    pub month: String,
    pub mlc_posterior: Option<f64>,
    pub log_bayes_factor: Option<f64>,
    pub outbreak_posterior: Option<f64>,
    pub zone: Option<usize>,
    pub zone_districts: Option<String>,
    pub duration: Option<usize>,
    pub map_relative_risk: Option<f64>,
    pub failure: Option<FailureKind>,
    pub failure_message: Option<String>,
}

impl BayesRow {
    #[must_use]
    pub fn new(
        record: &StepRecord<BayesScanResult>,
        calendar: &PeriodCalendar,
        zones: &ZoneLabels,
    ) -> Self {
        let (result, failure, failure_message) = split(record);
        Self {
            period: record.period,
            month: calendar.period_label(record.period),
            mlc_posterior: result.map(|r| r.mlc_posterior),
            log_bayes_factor: result.map(|r| r.log_bayes_factor),
            outbreak_posterior: result.map(|r| r.outbreak_posterior),
            zone: result.map(|r| r.zone),
            zone_districts: result.and_then(|r| zones.get(r.zone)).map(str::to_string),
            duration: result.map(|r| r.duration),
            map_relative_risk: result.map(|r| r.map_relative_risk),
            failure,
            failure_message,
        }
    }
}

/// `hotelling.csv` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotellingRow {
    pub period: u32,
    pub month: String,
    pub t2: Option<f64>,
    pub critical_value: Option<f64>,
    pub p_value: Option<f64>,
    pub alarm: Option<bool>,
    pub observations: Option<usize>,
    pub failure: Option<FailureKind>,
    pub failure_message: Option<String>,
}

impl HotellingRow {
    #[must_use]
    pub fn new(record: &StepRecord<T2Result>, calendar: &PeriodCalendar) -> Self {
        let (result, failure, failure_message) = split(record);
        Self {
            period: record.period,
            month: calendar.period_label(record.period),
            t2: result.map(|r| r.t2),
            critical_value: result.map(|r| r.critical_value),
            p_value: result.map(|r| r.p_value),
            alarm: result.map(T2Result::is_alarm),
            observations: result.map(|r| r.observations),
            failure,
            failure_message,
        }
    }
}

/// Serialises `rows` as CSV with a header row.
///
/// # Errors
///
/// Returns the CSV writer's error if a row cannot be serialised or
/// written.
pub fn write_rows<W, S, I>(writer: W, rows: I) -> Result<usize, csv::Error>
where
    W: std::io::Write,
    S: Serialize,
    I: IntoIterator<Item = S>,
{
    let mut writer = csv::Writer::from_writer(writer);
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use outbreak_models::DetectionError;

    use super::*;

    fn calendar() -> PeriodCalendar {
        PeriodCalendar::new(NaiveDate::from_ymd_opt(2002, 1, 1).unwrap())
    }

    fn to_csv<S: Serialize>(rows: Vec<S>) -> String {
        let mut out = Vec::new();
        write_rows(&mut out, rows).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn completed_hotelling_step() {
        let record = StepRecord::from_result(
            5,
            Ok(T2Result {
                t2: 20.0,
                critical_value: 10.0,
                p_value: 0.01,
                observations: 4,
            }),
        );
        let csv = to_csv(vec![HotellingRow::new(&record, &calendar())]);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "period,month,t2,critical_value,p_value,alarm,observations,failure,failure_message"
        );
        assert_eq!(lines.next().unwrap(), "5,2002-05,20.0,10.0,0.01,true,4,,");
    }

    #[test]
    fn failed_step_leaves_numbers_empty() {
        let record: StepRecord<T2Result> = StepRecord::from_result(
            2,
            Err(DetectionError::SingularCovariance {
                observations: 1,
                dimensions: 3,
            }),
        );
        let row = HotellingRow::new(&record, &calendar());
        assert_eq!(row.failure, Some(FailureKind::SingularCovariance));
        assert!(row.t2.is_none());

        let csv = to_csv(vec![row]);
        let line = csv.lines().nth(1).unwrap();
        assert!(line.starts_with("2,2002-02,,,,,,singular_covariance,"));
    }

    #[test]
    fn scan_row_names_zone_districts() {
        let zones = ZoneLabels::from_labels(vec!["0101".to_string(), "0101;0102".to_string()]);
        let record = StepRecord::from_result(
            6,
            Ok(ScanResult {
                observed_score: 12.5,
                critical_value: 4.0,
                p_value: 0.01,
                zone: 1,
                duration: 2,
                relative_risk_inside: 3.0,
                relative_risk_outside: None,
                replicates: 99,
            }),
        );
        let row = ScanRow::new(&record, &calendar(), &zones);
        assert_eq!(row.zone_districts.as_deref(), Some("0101;0102"));
        assert_eq!(row.alarm, Some(true));
        assert!(row.relative_risk_outside.is_none());
        assert_eq!(row.month, "2002-06");
    }

    #[test]
    fn bayes_failure_row() {
        let record: StepRecord<BayesScanResult> =
            StepRecord::from_result(3, Err(DetectionError::degenerate("empty window")));
        let row = BayesRow::new(&record, &calendar(), &ZoneLabels::default());
        assert_eq!(row.failure, Some(FailureKind::DegenerateZone));
        assert!(row.failure_message.unwrap().contains("empty window"));
        assert!(row.zone.is_none());
    }
}
