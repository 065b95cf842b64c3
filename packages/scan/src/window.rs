//! The look-back observation window and its space-time cylinders.

use outbreak_aggregate::CountMatrix;
use outbreak_models::DetectionError;
use outbreak_zones::ZoneCatalog;

/// Counts and null expectations for the periods `first..=last`.
///
/// Expected counts follow the population-based null: the window total is
/// spread over every (district, period) cell in proportion to population.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationWindow {
    first: u32,
    last: u32,
    total: u64,
    /// `counts[district][offset]`, offset 0 is `first`.
    counts: Vec<Vec<u64>>,
    /// Same layout as `counts`.
    expected: Vec<Vec<f64>>,
}

/// Observed and expected totals for one (zone, duration) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cylinder {
    /// Zone index in the catalog.
    pub zone: usize,
    /// Number of most recent periods covered.
    pub duration: usize,
    /// Observed count inside.
    pub observed: f64,
    /// Expected count inside.
    pub expected: f64,
}

impl ObservationWindow {
    /// Builds the window ending at `period` and reaching back at most
    /// `length` periods (never before the matrix's first period).
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if `period` is not
    /// in the matrix or `length` is zero, and
    /// [`DetectionError::MissingReferenceData`] if the districts have no
    /// population.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn ending_at(
        matrix: &CountMatrix,
        period: u32,
        length: usize,
    ) -> Result<Self, DetectionError> {
        if length == 0 {
            return Err(DetectionError::invalid("window length must be at least 1"));
        }
        if period < matrix.first_period() || period > matrix.last_period() {
            return Err(DetectionError::invalid(format!(
                "period {period} is outside {}..={}",
                matrix.first_period(),
                matrix.last_period()
            )));
        }

        let first = period
            .saturating_sub(length as u32 - 1)
            .max(matrix.first_period());
        let counts: Vec<Vec<u64>> = (0..matrix.district_count())
            .map(|d| matrix.series(d, first, period).to_vec())
            .collect();

        Self::from_counts(first, period, matrix.populations(), counts)
    }

    /// Builds a window from explicit counts.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::MissingReferenceData`] if the total
    /// population is not positive.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(
        first: u32,
        last: u32,
        populations: &[f64],
        counts: Vec<Vec<u64>>,
    ) -> Result<Self, DetectionError> {
        let periods = (last - first + 1) as usize;
        let population: f64 = populations.iter().sum();
        if population.is_nan() || population <= 0.0 {
            return Err(DetectionError::missing(
                "districts have no population to derive expected counts from",
            ));
        }

        let total: u64 = counts.iter().flatten().sum();
        let per_person_period = total as f64 / (population * periods as f64);
        let expected = populations
            .iter()
            .map(|&pop| vec![pop * per_person_period; periods])
            .collect();

        Ok(Self {
            first,
            last,
            total,
            counts,
            expected,
        })
    }

    /// The same window with counts replaced, keeping the expectations.
    /// Used for null replicates, which preserve the window total.
    #[must_use]
    pub fn with_counts(&self, counts: Vec<Vec<u64>>) -> Self {
        Self {
            counts,
            ..self.clone()
        }
    }

    /// First period in the window.
    #[must_use]
    pub const fn first(&self) -> u32 {
        self.first
    }

    /// Last period in the window (the current surveillance step).
    #[must_use]
    pub const fn last(&self) -> u32 {
        self.last
    }

    /// Number of periods in the window.
    #[must_use]
    pub const fn len(&self) -> usize {
        (self.last - self.first + 1) as usize
    }

    /// Whether the window has no periods (never true once constructed).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.last < self.first
    }

    /// Total observed count.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Observed counts per cell, `[district][offset]`.
    #[must_use]
    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    /// Expected counts per cell, `[district][offset]`.
    #[must_use]
    pub fn expected(&self) -> &[Vec<f64>] {
        &self.expected
    }

    /// Every (zone, duration) cylinder, ordered by zone index then
    /// duration. Durations run from 1 to the window length and always end
    /// at the window's last period.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cylinders(&self, catalog: &ZoneCatalog) -> Vec<Cylinder> {
        let len = self.len();
        let observed_tail: Vec<Vec<f64>> = self
            .counts
            .iter()
            .map(|row| tail_sums(row.iter().map(|&c| c as f64), len))
            .collect();
        let expected_tail: Vec<Vec<f64>> = self
            .expected
            .iter()
            .map(|row| tail_sums(row.iter().copied(), len))
            .collect();

        let mut cylinders = Vec::with_capacity(catalog.len() * len);
        for (zone, members) in catalog.iter().enumerate() {
            for duration in 1..=len {
                let (observed, expected) = members.members().iter().fold(
                    (0.0, 0.0),
                    |(o, e), &d| (o + observed_tail[d][duration], e + expected_tail[d][duration]),
                );
                cylinders.push(Cylinder {
                    zone,
                    duration,
                    observed,
                    expected,
                });
            }
        }
        cylinders
    }
}

/// `out[d]` is the sum of the last `d` values (`out[0] == 0`).
fn tail_sums(values: impl DoubleEndedIterator<Item = f64>, len: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(len + 1);
    out.push(0.0);
    let mut acc = 0.0;
    for v in values.rev() {
        acc += v;
        out.push(acc);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> CountMatrix {
        CountMatrix::from_counts(
            1,
            vec![100.0, 300.0],
            vec![vec![1, 2, 3, 4], vec![0, 0, 5, 5]],
        )
        .unwrap()
    }

    #[test]
    fn window_is_clamped_to_first_period() {
        let window = ObservationWindow::ending_at(&matrix(), 2, 6).unwrap();
        assert_eq!(window.first(), 1);
        assert_eq!(window.last(), 2);
        assert_eq!(window.len(), 2);
        assert_eq!(window.total(), 3);
    }

    #[test]
    fn window_reaches_back_length_periods() {
        let window = ObservationWindow::ending_at(&matrix(), 4, 2).unwrap();
        assert_eq!(window.first(), 3);
        assert_eq!(window.total(), 17);
    }

    #[test]
    fn expected_counts_follow_population() {
        let window = ObservationWindow::ending_at(&matrix(), 4, 2).unwrap();
        let expected = window.expected();
        // 17 cases over 400 people × 2 periods.
        assert!((expected[0][0] - 17.0 * 100.0 / 800.0).abs() < 1e-12);
        assert!((expected[1][1] - 17.0 * 300.0 / 800.0).abs() < 1e-12);
        let sum: f64 = expected.iter().flatten().sum();
        assert!((sum - 17.0).abs() < 1e-9);
    }

    #[test]
    fn cylinders_sum_most_recent_periods() {
        let catalog = ZoneCatalog::from_members(2, vec![vec![0], vec![0, 1]]).unwrap();
        let window = ObservationWindow::ending_at(&matrix(), 4, 3).unwrap();
        let cylinders = window.cylinders(&catalog);
        assert_eq!(cylinders.len(), 6);
        assert_eq!((cylinders[0].zone, cylinders[0].duration), (0, 1));
        assert!((cylinders[0].observed - 4.0).abs() < f64::EPSILON);
        assert!((cylinders[2].observed - 9.0).abs() < f64::EPSILON);
        assert!((cylinders[4].observed - 17.0).abs() < f64::EPSILON);
        assert!((cylinders[5].expected - 19.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_period_outside_matrix() {
        assert!(ObservationWindow::ending_at(&matrix(), 5, 2).is_err());
        assert!(ObservationWindow::ending_at(&matrix(), 2, 0).is_err());
    }

    #[test]
    fn zero_population_is_missing_data() {
        let err = ObservationWindow::from_counts(1, 1, &[0.0], vec![vec![3]]).unwrap_err();
        assert!(matches!(err, DetectionError::MissingReferenceData { .. }));
    }
}
