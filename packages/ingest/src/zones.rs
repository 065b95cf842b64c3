//! Zone catalog CSV (`zone,tile_id`, one row per membership).
//!
//! Zones keep the order in which their labels first appear.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use outbreak_models::{DetectionError, ReferenceGrid};
use outbreak_zones::ZoneCatalog;
use serde::Deserialize;

use crate::{IngestError, open};

#[derive(Debug, Deserialize)]
struct Membership {
    zone: String,
    tile_id: String,
}

/// Loads a zone catalog file against the reference grid.
///
/// # Errors
///
/// See [`read_zone_catalog`].
pub fn load_zone_catalog(path: &Path, grid: &ReferenceGrid) -> Result<ZoneCatalog, IngestError> {
    let catalog = read_zone_catalog(open(path)?, &path.display().to_string(), grid)?;
    log::info!("Loaded {} zones from {}", catalog.len(), path.display());
    Ok(catalog)
}

/// Reads zone memberships and resolves tile IDs to grid indices.
///
/// # Errors
///
/// Returns [`IngestError::Csv`] for a malformed row,
/// [`DetectionError::MissingReferenceData`] for a tile that is not in the
/// grid, and [`DetectionError::InvalidConfiguration`] if no zones remain.
pub fn read_zone_catalog<R: Read>(
    reader: R,
    source_name: &str,
    grid: &ReferenceGrid,
) -> Result<ZoneCatalog, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut labels: BTreeMap<String, usize> = BTreeMap::new();
    let mut members: Vec<Vec<usize>> = Vec::new();

    for result in reader.deserialize::<Membership>() {
        let row = result.map_err(|source| IngestError::Csv {
            path: source_name.to_string(),
            source,
        })?;

        let Some(district) = grid.district_index(&row.tile_id) else {
            return Err(DetectionError::missing(format!(
                "zone {} references district {} which is not in the reference grid",
                row.zone, row.tile_id
            ))
            .into());
        };

        let next = members.len();
        let zone = *labels.entry(row.zone).or_insert(next);
        if zone == next {
            members.push(Vec::new());
        }
        members[zone].push(district);
    }

    Ok(ZoneCatalog::from_members(grid.districts.len(), members)?)
}

#[cfg(test)]
mod tests {
    use outbreak_models::District;

    use super::*;

    fn grid() -> ReferenceGrid {
        ReferenceGrid {
            districts: ["0101", "0102", "0201", "0202"]
                .iter()
                .map(|tile| District {
                    tile_id: (*tile).to_string(),
                    area: 1.0,
                    population: 1.0,
                    x: 0.0,
                    y: 0.0,
                })
                .collect(),
            first_period: 1,
            last_period: 6,
        }
    }

    #[test]
    fn groups_memberships_in_file_order() {
        let csv = "zone,tile_id\n7,0201\n7,0202\n3,0101\n7,0102\n";
        let catalog = read_zone_catalog(csv.as_bytes(), "zones.csv", &grid()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(0).unwrap().members(), &[1, 2, 3]);
        assert_eq!(catalog.get(1).unwrap().members(), &[0]);
    }

    #[test]
    fn unknown_tile_is_missing_reference_data() {
        let csv = "zone,tile_id\n1,0101\n1,0999\n";
        let err = read_zone_catalog(csv.as_bytes(), "zones.csv", &grid()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Detection(DetectionError::MissingReferenceData { .. })
        ));
    }

    #[test]
    fn empty_file_is_invalid() {
        let err = read_zone_catalog("zone,tile_id\n".as_bytes(), "zones.csv", &grid()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Detection(DetectionError::InvalidConfiguration { .. })
        ));
    }
}
