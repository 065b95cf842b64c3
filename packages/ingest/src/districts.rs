//! District reference grid, from CSV (`tile_id,area,population,x,y`) or a
//! `GeoJSON` `FeatureCollection`.
//!
//! `GeoJSON` features carry `tile_id`, `population`, and optionally `area`
//! properties. The centroid is computed from the feature geometry; a
//! missing `area` falls back to the planar area of the geometry.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use geo::{Area as _, Centroid as _};
use geojson::GeoJson;
use outbreak_models::District;
use serde_json::Value;

use crate::{IngestError, open};

/// Loads districts, choosing the format from the file extension
/// (`.geojson`/`.json` or CSV otherwise).
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or a district is
/// unusable (see [`read_districts_csv`]).
pub fn load_districts(path: &Path) -> Result<Vec<District>, IngestError> {
    let name = path.display().to_string();
    let is_geojson = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"));

    let districts = if is_geojson {
        let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: name.clone(),
            source,
        })?;
        parse_districts_geojson(&text, &name)?
    } else {
        read_districts_csv(open(path)?, &name)?
    };

    log::info!("Loaded {} districts from {name}", districts.len());
    Ok(districts)
}

/// Reads districts from CSV.
///
/// # Errors
///
/// Returns [`IngestError::Csv`] for a malformed row and
/// [`IngestError::Invalid`] for a duplicate tile ID or a negative,
/// non-finite population or area.
pub fn read_districts_csv<R: Read>(
    reader: R,
    source_name: &str,
) -> Result<Vec<District>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut districts = Vec::new();
    for result in reader.deserialize::<District>() {
        districts.push(result.map_err(|source| IngestError::Csv {
            path: source_name.to_string(),
            source,
        })?);
    }

    validate(&districts, source_name)?;
    Ok(districts)
}

/// Parses districts from a `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns [`IngestError::GeoJson`] if the text is not a feature
/// collection or a feature lacks a usable geometry or `tile_id`/
/// `population` property, and [`IngestError::Invalid`] as for CSV input.
pub fn parse_districts_geojson(
    text: &str,
    source_name: &str,
) -> Result<Vec<District>, IngestError> {
    let geojson_error = |message: String| IngestError::GeoJson {
        path: source_name.to_string(),
        message,
    };

    let geojson: GeoJson = text.parse().map_err(|e| geojson_error(format!("{e}")))?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(geojson_error("expected a FeatureCollection".to_string()));
    };

    let mut districts = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        let tile_id = match feature.property("tile_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(geojson_error(format!("feature {i} has no tile_id"))),
        };
        let Some(population) = feature.property("population").and_then(Value::as_f64) else {
            return Err(geojson_error(format!("district {tile_id} has no population")));
        };
        let area = feature.property("area").and_then(Value::as_f64);

        let Some(geometry) = feature.geometry else {
            return Err(geojson_error(format!("district {tile_id} has no geometry")));
        };
        let geometry: geo::Geometry<f64> = geometry
            .try_into()
            .map_err(|e| geojson_error(format!("district {tile_id}: {e}")))?;
        let Some(centroid) = geometry.centroid() else {
            return Err(geojson_error(format!("district {tile_id} has an empty geometry")));
        };

        districts.push(District {
            area: area.unwrap_or_else(|| geometry.unsigned_area()),
            tile_id,
            population,
            x: centroid.x(),
            y: centroid.y(),
        });
    }

    validate(&districts, source_name)?;
    Ok(districts)
}

fn validate(districts: &[District], source_name: &str) -> Result<(), IngestError> {
    let invalid = |message: String| IngestError::Invalid {
        path: source_name.to_string(),
        message,
    };

    let mut seen = BTreeSet::new();
    for district in districts {
        if !seen.insert(district.tile_id.as_str()) {
            return Err(invalid(format!(
                "district {} appears more than once",
                district.tile_id
            )));
        }
        if !(district.population.is_finite() && district.population >= 0.0) {
            return Err(invalid(format!(
                "district {} has population {}",
                district.tile_id, district.population
            )));
        }
        if !(district.area.is_finite() && district.area >= 0.0) {
            return Err(invalid(format!(
                "district {} has area {}",
                district.tile_id, district.area
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_csv() {
        let csv = "tile_id,area,population,x,y\n01001,56.4,89504,4320.1,6070.2\n01002,118.6,243148,4352.0,6020.5\n";
        let districts = read_districts_csv(csv.as_bytes(), "districts.csv").unwrap();
        assert_eq!(districts.len(), 2);
        assert_eq!(districts[1].tile_id, "01002");
        assert_eq!(districts[1].state_id(), Some("01"));
        assert!((districts[0].population - 89_504.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_duplicate_tiles() {
        let csv = "tile_id,area,population,x,y\n0101,1,1,0,0\n0101,1,1,0,0\n";
        assert!(matches!(
            read_districts_csv(csv.as_bytes(), "districts.csv"),
            Err(IngestError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_negative_population() {
        let csv = "tile_id,area,population,x,y\n0101,1,-5,0,0\n";
        assert!(matches!(
            read_districts_csv(csv.as_bytes(), "districts.csv"),
            Err(IngestError::Invalid { .. })
        ));
    }

    #[test]
    fn reads_geojson_centroids() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"tile_id": "0101", "population": 1000},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0, 0], [2, 0], [2, 2], [0, 2], [0, 0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"tile_id": 201, "population": 50.5, "area": 7.5},
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [[[[10, 10], [12, 10], [12, 14], [10, 14], [10, 10]]]]
                    }
                }
            ]
        }"#;
        let districts = parse_districts_geojson(text, "districts.geojson").unwrap();
        assert_eq!(districts.len(), 2);

        assert_eq!(districts[0].tile_id, "0101");
        assert!((districts[0].x - 1.0).abs() < 1e-12);
        assert!((districts[0].y - 1.0).abs() < 1e-12);
        assert!((districts[0].area - 4.0).abs() < 1e-12);

        assert_eq!(districts[1].tile_id, "201");
        assert!((districts[1].x - 11.0).abs() < 1e-12);
        assert!((districts[1].y - 12.0).abs() < 1e-12);
        assert!((districts[1].area - 7.5).abs() < 1e-12);
    }

    #[test]
    fn geojson_requires_feature_collection() {
        let text = r#"{"type": "Point", "coordinates": [1, 2]}"#;
        assert!(matches!(
            parse_districts_geojson(text, "districts.geojson"),
            Err(IngestError::GeoJson { .. })
        ));
    }

    #[test]
    fn geojson_requires_population() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"tile_id": "0101"},
                "geometry": {"type": "Point", "coordinates": [1, 2]}
            }]
        }"#;
        let err = parse_districts_geojson(text, "districts.geojson").unwrap_err();
        assert!(err.to_string().contains("no population"));
    }
}
