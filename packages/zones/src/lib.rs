#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Candidate-cluster zone catalog.
//!
//! A zone is a set of district indices (reference-grid order) scanned as a
//! possible cluster. The catalog is built once before any scan and only
//! ever borrowed immutably afterwards.
//!
//! Catalogs either come from an external zone file or are built with
//! [`ZoneCatalog::knn`], which grows a zone around every district by adding
//! its nearest neighbours one at a time using an R-tree over the district
//! centroids.

use std::collections::BTreeSet;

use outbreak_models::{DetectionError, ReferenceGrid};
use rstar::RTree;
use rstar::primitives::GeomWithData;

/// A candidate cluster: sorted, deduplicated district indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zone {
    members: Vec<usize>,
}

impl Zone {
    /// District indices in ascending order.
    #[must_use]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Number of districts in the zone.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`; catalogs never hold empty zones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Fixed, ordered collection of zones. Zone indices are positions in this
/// collection and are what scan results report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneCatalog {
    zones: Vec<Zone>,
    district_count: usize,
}

type CentroidEntry = GeomWithData<[f64; 2], usize>;

impl ZoneCatalog {
    /// Builds a catalog from explicit member lists.
    ///
    /// Member lists are sorted and deduplicated; a zone identical to an
    /// earlier one is dropped so indices stay unique per member set.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if a zone is empty
    /// or references a district index outside `0..district_count`.
    pub fn from_members(
        district_count: usize,
        zones: Vec<Vec<usize>>,
    ) -> Result<Self, DetectionError> {
        let mut seen = BTreeSet::new();
        let mut catalog = Vec::with_capacity(zones.len());

        for (i, mut members) in zones.into_iter().enumerate() {
            members.sort_unstable();
            members.dedup();

            if members.is_empty() {
                return Err(DetectionError::invalid(format!("zone {i} has no districts")));
            }
            if let Some(&bad) = members.iter().find(|&&d| d >= district_count) {
                return Err(DetectionError::invalid(format!(
                    "zone {i} references district {bad} but there are only {district_count}"
                )));
            }

            if seen.insert(members.clone()) {
                catalog.push(Zone { members });
            } else {
                log::debug!("Dropping duplicate zone {i}");
            }
        }

        if catalog.is_empty() {
            return Err(DetectionError::invalid("zone catalog is empty"));
        }

        Ok(Self {
            zones: catalog,
            district_count,
        })
    }

    /// Builds the k-nearest-neighbour catalog over district centroids.
    ///
    /// For every district `i` (in order) the zones `{i}`, `{i, n₁}`, …,
    /// `{i, n₁, …, n_{k−1}}` are produced, where `nⱼ` is the `j`th nearest
    /// other district. Distance ties are broken by district index.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidConfiguration`] if `k` is zero or
    /// exceeds the number of districts, or a centroid is not finite.
    pub fn knn(centroids: &[[f64; 2]], k: usize) -> Result<Self, DetectionError> {
        if k == 0 || k > centroids.len() {
            return Err(DetectionError::invalid(format!(
                "k = {k} must be between 1 and the number of districts ({})",
                centroids.len()
            )));
        }
        if let Some(i) = centroids
            .iter()
            .position(|c| !c[0].is_finite() || !c[1].is_finite())
        {
            return Err(DetectionError::invalid(format!(
                "district {i} has a non-finite centroid"
            )));
        }

        let tree: RTree<CentroidEntry> = RTree::bulk_load(
            centroids
                .iter()
                .enumerate()
                .map(|(i, c)| CentroidEntry::new(*c, i))
                .collect(),
        );

        let mut zones = Vec::with_capacity(centroids.len() * k);
        for (i, centroid) in centroids.iter().enumerate() {
            let neighbours = nearest(&tree, i, centroid, k);
            for size in 1..=k {
                zones.push(neighbours[..size].to_vec());
            }
        }

        let catalog = Self::from_members(centroids.len(), zones)?;
        log::info!(
            "Built {} zones from {} districts (k = {k})",
            catalog.len(),
            centroids.len()
        );
        Ok(catalog)
    }

    /// Builds the k-nearest-neighbour catalog from a reference grid's
    /// district centroids.
    ///
    /// # Errors
    ///
    /// See [`ZoneCatalog::knn`].
    pub fn knn_for_grid(grid: &ReferenceGrid, k: usize) -> Result<Self, DetectionError> {
        let centroids: Vec<[f64; 2]> = grid.districts.iter().map(|d| [d.x, d.y]).collect();
        Self::knn(&centroids, k)
    }

    /// Number of zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether the catalog is empty (never true for a constructed catalog).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Number of districts the catalog indexes into.
    #[must_use]
    pub const fn district_count(&self) -> usize {
        self.district_count
    }

    /// A zone by index.
    #[must_use]
    pub fn get(&self, zone: usize) -> Option<&Zone> {
        self.zones.get(zone)
    }

    /// Zones in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }
}

/// The `k` districts closest to `origin` (itself first), ties by index.
fn nearest(
    tree: &RTree<CentroidEntry>,
    origin: usize,
    point: &[f64; 2],
    k: usize,
) -> Vec<usize> {
    let mut found: Vec<(f64, usize)> = Vec::with_capacity(k);

    for (entry, dist2) in tree.nearest_neighbor_iter_with_distance_2(point) {
        if found.len() >= k && found.last().is_some_and(|&(last, _)| dist2 > last) {
            break;
        }
        found.push((dist2, entry.data));
    }

    found.sort_by(|a, b| {
        (a.1 != origin)
            .cmp(&(b.1 != origin))
            .then(a.0.total_cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });
    found.truncate(k);
    found.into_iter().map(|(_, i)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Vec<[f64; 2]> {
        (0..n).map(|i| [i as f64, 0.0]).collect()
    }

    #[test]
    fn knn_with_k_one_gives_singletons() {
        let catalog = ZoneCatalog::knn(&line(4), 1).unwrap();
        assert_eq!(catalog.len(), 4);
        for (i, zone) in catalog.iter().enumerate() {
            assert_eq!(zone.members(), &[i]);
        }
    }

    #[test]
    fn knn_grows_zones_by_distance() {
        let centroids = vec![[0.0, 0.0], [1.0, 0.0], [5.0, 0.0]];
        let catalog = ZoneCatalog::knn(&centroids, 2).unwrap();
        let zones: Vec<&[usize]> = catalog.iter().map(Zone::members).collect();
        // {0}, {0,1}, {1}, {0,1} (dup), {2}, {1,2}
        assert_eq!(zones, vec![&[0][..], &[0, 1], &[1], &[2], &[1, 2]]);
    }

    #[test]
    fn knn_breaks_distance_ties_by_index() {
        // District 1 is equidistant from 0 and 2.
        let centroids = line(3);
        let tree: RTree<CentroidEntry> = RTree::bulk_load(
            centroids
                .iter()
                .enumerate()
                .map(|(i, c)| CentroidEntry::new(*c, i))
                .collect(),
        );
        assert_eq!(nearest(&tree, 1, &centroids[1], 2), vec![1, 0]);
        assert_eq!(nearest(&tree, 1, &centroids[1], 3), vec![1, 0, 2]);
    }

    #[test]
    fn knn_rejects_bad_k() {
        assert!(ZoneCatalog::knn(&line(3), 0).is_err());
        assert!(ZoneCatalog::knn(&line(3), 4).is_err());
    }

    #[test]
    fn knn_rejects_non_finite_centroids() {
        let centroids = vec![[0.0, 0.0], [f64::NAN, 1.0]];
        assert!(matches!(
            ZoneCatalog::knn(&centroids, 1),
            Err(DetectionError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn explicit_members_are_normalised() {
        let catalog =
            ZoneCatalog::from_members(3, vec![vec![2, 0, 2], vec![0, 2], vec![1]]).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(0).unwrap().members(), &[0, 2]);
        assert_eq!(catalog.get(1).unwrap().members(), &[1]);
        assert_eq!(catalog.district_count(), 3);
    }

    #[test]
    fn explicit_members_are_validated() {
        assert!(ZoneCatalog::from_members(2, vec![vec![]]).is_err());
        assert!(ZoneCatalog::from_members(2, vec![vec![0, 2]]).is_err());
        assert!(ZoneCatalog::from_members(2, vec![]).is_err());
    }
}
