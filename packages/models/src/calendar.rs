//! Mapping between continuous day indices, dates, and monthly periods.
//!
//! Case times are stored as a continuous day index counted from an origin
//! date. Period 1 is the calendar month containing the origin; period `k`
//! is the `k − 1`th month after it.

use chrono::{Datelike as _, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Converts day indices to dates and monthly period indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCalendar {
    /// Date corresponding to day index 0.
    pub origin: NaiveDate,
}

impl PeriodCalendar {
    /// Creates a calendar anchored at `origin`.
    #[must_use]
    pub const fn new(origin: NaiveDate) -> Self {
        Self { origin }
    }

    /// Calendar date of a day index (fractional days are truncated toward
    /// the start of the day).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn date_of(&self, day: f64) -> Option<NaiveDate> {
        if !day.is_finite() {
            return None;
        }
        let whole = day.floor();
        if whole >= 0.0 {
            self.origin.checked_add_days(Days::new(whole as u64))
        } else {
            self.origin.checked_sub_days(Days::new((-whole) as u64))
        }
    }

    /// 1-based monthly period of a day index. Days before the origin month
    /// have no period.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn period_of(&self, day: f64) -> Option<u32> {
        let date = self.date_of(day)?;
        let months = (date.year() - self.origin.year()) * 12 + date.month0() as i32
            - self.origin.month0() as i32;
        u32::try_from(months + 1).ok().filter(|&p| p > 0)
    }

    /// First day of a period.
    #[must_use]
    pub fn period_start(&self, period: u32) -> Option<NaiveDate> {
        let first = self.origin.with_day(1)?;
        first.checked_add_months(Months::new(period.checked_sub(1)?))
    }

    /// `YYYY-MM` label of a period, or the bare index if it cannot be
    /// represented as a date.
    #[must_use]
    pub fn period_label(&self, period: u32) -> String {
        self.period_start(period).map_or_else(
            || period.to_string(),
            |date| format!("{:04}-{:02}", date.year(), date.month()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> PeriodCalendar {
        PeriodCalendar::new(NaiveDate::from_ymd_opt(2002, 1, 1).unwrap())
    }

    #[test]
    fn day_zero_is_origin_and_first_period() {
        let cal = calendar();
        assert_eq!(cal.date_of(0.0), NaiveDate::from_ymd_opt(2002, 1, 1));
        assert_eq!(cal.period_of(0.0), Some(1));
        assert_eq!(cal.period_of(30.9), Some(1));
    }

    #[test]
    fn months_roll_over_years() {
        let cal = calendar();
        // 2003-02-01 is 396 days after 2002-01-01.
        assert_eq!(cal.period_of(396.0), Some(14));
        assert_eq!(cal.period_label(14), "2003-02");
    }

    #[test]
    fn days_before_origin_have_no_period() {
        let cal = calendar();
        assert_eq!(cal.period_of(-1.0), None);
        assert_eq!(cal.date_of(-1.0), NaiveDate::from_ymd_opt(2001, 12, 31));
    }

    #[test]
    fn whole_month_before_origin_has_no_period() {
        let cal = calendar();
        assert_eq!(cal.period_of(-31.0), None);
        assert_eq!(cal.period_of(-40.0), None);
        assert_eq!(cal.period_of(0.0), Some(1));
    }

    #[test]
    fn period_start_uses_first_of_month() {
        let cal = PeriodCalendar::new(NaiveDate::from_ymd_opt(2002, 1, 17).unwrap());
        assert_eq!(cal.period_start(1), NaiveDate::from_ymd_opt(2002, 1, 1));
        assert_eq!(cal.period_start(0), None);
        assert_eq!(cal.period_label(0), "0");
    }

    #[test]
    fn non_finite_days_are_rejected() {
        assert_eq!(calendar().date_of(f64::NAN), None);
    }
}
