#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Case aggregation into monthly district and state counts.
//!
//! Raw [`CaseEvent`]s are counted per (district, period) over the full
//! reference grid so that empty cells become explicit zero rows. State
//! rows are sums of district rows sharing a two-character tile prefix.
//! The dense [`CountMatrix`] and [`StateMatrix`] views feed the scan and
//! Hotelling engines.

mod matrix;

use std::collections::BTreeMap;

use outbreak_models::{
    CaseEvent, DetectionError, DistrictPeriod, PeriodCalendar, ReferenceGrid, StatePeriod,
};

pub use matrix::{CountMatrix, StateMatrix};

/// Counts cases per district and period over the whole reference grid.
///
/// Every (district, period) pair of the grid yields one row; pairs without
/// cases get a count of zero. Cases outside the grid's period range are
/// excluded and logged. Output is sorted by tile ID, then period.
///
/// # Errors
///
/// Returns [`DetectionError::MissingReferenceData`] if a case references a
/// district that is not in the grid, or has a time that cannot be mapped
/// to a period.
pub fn aggregate_district_periods(
    events: &[CaseEvent],
    grid: &ReferenceGrid,
    calendar: &PeriodCalendar,
) -> Result<Vec<DistrictPeriod>, DetectionError> {
    let mut counts: BTreeMap<(&str, u32), u64> = BTreeMap::new();
    for district in &grid.districts {
        for period in grid.first_period..=grid.last_period {
            counts.insert((district.tile_id.as_str(), period), 0);
        }
    }

    let mut out_of_range = 0_u64;

    for event in events {
        if grid.district_index(&event.tile_id).is_none() {
            return Err(DetectionError::missing(format!(
                "case {} references district {} which is not in the reference grid",
                event.id, event.tile_id
            )));
        }

        let Some(period) = calendar.period_of(event.time) else {
            return Err(DetectionError::missing(format!(
                "case {} has time {} which precedes the calendar origin {}",
                event.id, event.time, calendar.origin
            )));
        };

        match counts.get_mut(&(event.tile_id.as_str(), period)) {
            Some(count) => *count += 1,
            None => out_of_range += 1,
        }
    }

    if out_of_range > 0 {
        log::info!(
            "Excluded {out_of_range} cases outside periods {}..={}",
            grid.first_period,
            grid.last_period
        );
    }

    let mut rows: Vec<DistrictPeriod> = grid
        .districts
        .iter()
        .flat_map(|district| {
            (grid.first_period..=grid.last_period).map(|period| DistrictPeriod {
                tile_id: district.tile_id.clone(),
                period,
                area: district.area,
                population: district.population,
                count: counts
                    .get(&(district.tile_id.as_str(), period))
                    .copied()
                    .unwrap_or(0),
            })
        })
        .collect();

    rows.sort_by(|a, b| a.tile_id.cmp(&b.tile_id).then(a.period.cmp(&b.period)));

    log::debug!(
        "Aggregated {} cases into {} district-period rows",
        events.len(),
        rows.len()
    );

    Ok(rows)
}

/// Sums district rows into state rows keyed by the tile ID's
/// two-character prefix. Output is sorted by state ID, then period.
///
/// # Errors
///
/// Returns [`DetectionError::MissingReferenceData`] if a tile ID is too
/// short to carry a state prefix.
pub fn aggregate_state_periods(
    rows: &[DistrictPeriod],
) -> Result<Vec<StatePeriod>, DetectionError> {
    let mut states: BTreeMap<(String, u32), StatePeriod> = BTreeMap::new();

    for row in rows {
        let Some(state_id) = outbreak_models::state_id(&row.tile_id) else {
            return Err(DetectionError::missing(format!(
                "district {} has no state prefix",
                row.tile_id
            )));
        };

        let entry = states
            .entry((state_id.to_string(), row.period))
            .or_insert_with(|| StatePeriod {
                state_id: state_id.to_string(),
                period: row.period,
                area: 0.0,
                population: 0.0,
                count: 0,
            });
        entry.area += row.area;
        entry.population += row.population;
        entry.count += row.count;
    }

    Ok(states.into_values().collect())
}
