//! Dense count matrices built from aggregated rows.

use std::collections::BTreeMap;

use outbreak_models::{DetectionError, DistrictPeriod, ReferenceGrid, StatePeriod};

/// District × period case counts in reference-grid district order.
///
/// District indices match [`ReferenceGrid::districts`], which is the order
/// zone catalogs refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct CountMatrix {
    tile_ids: Vec<String>,
    populations: Vec<f64>,
    areas: Vec<f64>,
    first_period: u32,
    period_count: usize,
    /// `counts[district][period - first_period]`
    counts: Vec<Vec<u64>>,
}

impl CountMatrix {
    /// Builds the matrix and checks the district-period invariants: one
    /// row per district per grid period, constant population and area.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::MissingReferenceData`] if a row refers to
    /// a district or period outside the grid, a cell is duplicated or
    /// missing, or a district's covariates change over time.
    #[allow(clippy::float_cmp)]
    pub fn from_district_periods(
        grid: &ReferenceGrid,
        rows: &[DistrictPeriod],
    ) -> Result<Self, DetectionError> {
        let period_count = grid.period_count();
        let mut counts: Vec<Vec<Option<u64>>> =
            vec![vec![None; period_count]; grid.districts.len()];

        for row in rows {
            let Some(d) = grid.district_index(&row.tile_id) else {
                return Err(DetectionError::missing(format!(
                    "district {} is not in the reference grid",
                    row.tile_id
                )));
            };
            if !grid.contains_period(row.period) {
                return Err(DetectionError::missing(format!(
                    "period {} of district {} is outside {}..={}",
                    row.period, row.tile_id, grid.first_period, grid.last_period
                )));
            }

            let district = &grid.districts[d];
            if row.population != district.population || row.area != district.area {
                return Err(DetectionError::missing(format!(
                    "district {} has inconsistent population or area in period {}",
                    row.tile_id, row.period
                )));
            }

            let cell = &mut counts[d][(row.period - grid.first_period) as usize];
            if cell.replace(row.count).is_some() {
                return Err(DetectionError::missing(format!(
                    "district {} has more than one row for period {}",
                    row.tile_id, row.period
                )));
            }
        }

        let counts = counts
            .into_iter()
            .enumerate()
            .map(|(d, periods)| {
                periods
                    .into_iter()
                    .enumerate()
                    .map(|(offset, cell)| {
                        cell.ok_or_else(|| {
                            DetectionError::missing(format!(
                                "district {} has no row for period {}",
                                grid.districts[d].tile_id,
                                grid.first_period as usize + offset
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tile_ids: grid.districts.iter().map(|d| d.tile_id.clone()).collect(),
            populations: grid.districts.iter().map(|d| d.population).collect(),
            areas: grid.districts.iter().map(|d| d.area).collect(),
            first_period: grid.first_period,
            period_count,
            counts,
        })
    }

    /// Builds a matrix directly from counts, for synthetic data.
    ///
    /// `counts[district][offset]` is the count in period
    /// `first_period + offset`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if the rows differ
    /// in length or the population vector has the wrong length.
    pub fn from_counts(
        first_period: u32,
        populations: Vec<f64>,
        counts: Vec<Vec<u64>>,
    ) -> Result<Self, DetectionError> {
        if populations.len() != counts.len() {
            return Err(DetectionError::invalid(format!(
                "{} populations for {} districts",
                populations.len(),
                counts.len()
            )));
        }
        let period_count = counts.first().map_or(0, Vec::len);
        if counts.iter().any(|row| row.len() != period_count) {
            return Err(DetectionError::invalid(
                "every district must have the same number of periods",
            ));
        }

        Ok(Self {
            tile_ids: (0..counts.len()).map(|d| format!("{d:04}")).collect(),
            areas: vec![1.0; counts.len()],
            populations,
            first_period,
            period_count,
            counts,
        })
    }

    /// Number of districts.
    #[must_use]
    pub const fn district_count(&self) -> usize {
        self.counts.len()
    }

    /// Number of periods.
    #[must_use]
    pub const fn period_count(&self) -> usize {
        self.period_count
    }

    /// First period index.
    #[must_use]
    pub const fn first_period(&self) -> u32 {
        self.first_period
    }

    /// Last period index.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn last_period(&self) -> u32 {
        self.first_period + self.period_count.saturating_sub(1) as u32
    }

    /// Tile ID of a district.
    #[must_use]
    pub fn tile_id(&self, district: usize) -> &str {
        &self.tile_ids[district]
    }

    /// Population of every district.
    #[must_use]
    pub fn populations(&self) -> &[f64] {
        &self.populations
    }

    /// Area of every district.
    #[must_use]
    pub fn areas(&self) -> &[f64] {
        &self.areas
    }

    /// Count for a district in a period, or `None` outside the range.
    #[must_use]
    pub fn count(&self, district: usize, period: u32) -> Option<u64> {
        let offset = period.checked_sub(self.first_period)? as usize;
        self.counts.get(district)?.get(offset).copied()
    }

    /// Counts of one district for `first..=last`, clamped to the matrix.
    #[must_use]
    pub fn series(&self, district: usize, first: u32, last: u32) -> &[u64] {
        let start = first.saturating_sub(self.first_period) as usize;
        let end = (last.saturating_sub(self.first_period) as usize + 1).min(self.period_count);
        self.counts
            .get(district)
            .and_then(|row| row.get(start.min(end)..end))
            .unwrap_or(&[])
    }
}

/// Period × state counts for the multivariate control chart.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMatrix {
    states: Vec<String>,
    first_period: u32,
    /// `rows[period - first_period][state]`
    rows: Vec<Vec<f64>>,
}

impl StateMatrix {
    /// Builds the matrix from state rows. States are ordered by ID and
    /// every state must have a row for every period in a contiguous range.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::MissingReferenceData`] if a state is
    /// missing a period or has a duplicated one.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_state_periods(rows: &[StatePeriod]) -> Result<Self, DetectionError> {
        let mut cells: BTreeMap<(u32, &str), u64> = BTreeMap::new();
        let mut states: Vec<String> = Vec::new();

        for row in rows {
            if cells.insert((row.period, row.state_id.as_str()), row.count).is_some() {
                return Err(DetectionError::missing(format!(
                    "state {} has more than one row for period {}",
                    row.state_id, row.period
                )));
            }
            if !states.contains(&row.state_id) {
                states.push(row.state_id.clone());
            }
        }
        states.sort();

        let Some(first_period) = rows.iter().map(|r| r.period).min() else {
            return Ok(Self {
                states,
                first_period: 1,
                rows: Vec::new(),
            });
        };
        let last_period = rows.iter().map(|r| r.period).max().unwrap_or(first_period);

        let matrix = (first_period..=last_period)
            .map(|period| {
                states
                    .iter()
                    .map(|state| {
                        cells
                            .get(&(period, state.as_str()))
                            .map(|&count| count as f64)
                            .ok_or_else(|| {
                                DetectionError::missing(format!(
                                    "state {state} has no row for period {period}"
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            states,
            first_period,
            rows: matrix,
        })
    }

    /// Builds a matrix from raw observation rows, for synthetic data.
    #[must_use]
    pub fn from_rows(states: Vec<String>, first_period: u32, rows: Vec<Vec<f64>>) -> Self {
        Self {
            states,
            first_period,
            rows,
        }
    }

    /// State IDs in column order.
    #[must_use]
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Number of states (dimensions).
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.states.len()
    }

    /// First period index.
    #[must_use]
    pub const fn first_period(&self) -> u32 {
        self.first_period
    }

    /// Last period index.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn last_period(&self) -> u32 {
        self.first_period + self.rows.len().saturating_sub(1) as u32
    }

    /// The observation vector for a period.
    #[must_use]
    pub fn observation(&self, period: u32) -> Option<&[f64]> {
        let offset = period.checked_sub(self.first_period)? as usize;
        self.rows.get(offset).map(Vec::as_slice)
    }

    /// Every observation strictly before `period`.
    #[must_use]
    pub fn history_before(&self, period: u32) -> &[Vec<f64>] {
        let end = (period.saturating_sub(self.first_period) as usize).min(self.rows.len());
        &self.rows[..end]
    }
}

#[cfg(test)]
mod tests {
    use outbreak_models::District;

    use super::*;

    fn grid() -> ReferenceGrid {
        ReferenceGrid {
            districts: ["0102", "0101"]
                .iter()
                .map(|tile| District {
                    tile_id: (*tile).to_string(),
                    area: 1.0,
                    population: 50.0,
                    x: 0.0,
                    y: 0.0,
                })
                .collect(),
            first_period: 1,
            last_period: 2,
        }
    }

    fn row(tile: &str, period: u32, count: u64) -> DistrictPeriod {
        DistrictPeriod {
            tile_id: tile.to_string(),
            period,
            area: 1.0,
            population: 50.0,
            count,
        }
    }

    #[test]
    fn matrix_follows_grid_order() {
        let rows = [
            row("0101", 1, 4),
            row("0101", 2, 5),
            row("0102", 1, 6),
            row("0102", 2, 7),
        ];
        let matrix = CountMatrix::from_district_periods(&grid(), &rows).unwrap();
        assert_eq!(matrix.tile_id(0), "0102");
        assert_eq!(matrix.count(0, 2), Some(7));
        assert_eq!(matrix.count(1, 1), Some(4));
        assert_eq!(matrix.count(1, 3), None);
        assert_eq!(matrix.series(0, 1, 2), &[6, 7]);
        assert_eq!(matrix.last_period(), 2);
    }

    #[test]
    fn missing_cell_is_reported() {
        let rows = [row("0101", 1, 4), row("0102", 1, 6), row("0102", 2, 7)];
        let err = CountMatrix::from_district_periods(&grid(), &rows).unwrap_err();
        assert!(err.to_string().contains("0101 has no row for period 2"));
    }

    #[test]
    fn duplicate_cell_is_reported() {
        let rows = [row("0101", 1, 4), row("0101", 1, 4)];
        assert!(matches!(
            CountMatrix::from_district_periods(&grid(), &rows),
            Err(DetectionError::MissingReferenceData { .. })
        ));
    }

    #[test]
    fn changing_population_is_reported() {
        let mut changed = row("0101", 2, 5);
        changed.population = 51.0;
        let rows = [row("0101", 1, 4), changed];
        assert!(CountMatrix::from_district_periods(&grid(), &rows).is_err());
    }

    #[test]
    fn state_matrix_orders_states_and_periods() {
        let rows: Vec<StatePeriod> = [("02", 1, 3), ("01", 1, 1), ("01", 2, 2), ("02", 2, 4)]
            .iter()
            .map(|&(state, period, count)| StatePeriod {
                state_id: state.to_string(),
                period,
                area: 1.0,
                population: 1.0,
                count,
            })
            .collect();
        let matrix = StateMatrix::from_state_periods(&rows).unwrap();
        assert_eq!(matrix.states(), &["01".to_string(), "02".to_string()]);
        assert_eq!(matrix.observation(2), Some([2.0, 4.0].as_slice()));
        assert_eq!(matrix.history_before(2).len(), 1);
        assert_eq!(matrix.history_before(1).len(), 0);
        assert_eq!(matrix.last_period(), 2);
    }

    #[test]
    fn state_matrix_requires_every_period() {
        let rows: Vec<StatePeriod> = [("01", 1, 1), ("01", 2, 2), ("02", 2, 4)]
            .iter()
            .map(|&(state, period, count)| StatePeriod {
                state_id: state.to_string(),
                period,
                area: 1.0,
                population: 1.0,
                count,
            })
            .collect();
        assert!(StateMatrix::from_state_periods(&rows).is_err());
    }
}
