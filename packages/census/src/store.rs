//! Census table access.
//!
//! [`CensusTables`] is the seam between the cleaning logic and storage. The
//! `DuckDB` implementation queries the `census_de` schema; tests use an
//! in-memory fake.

use std::collections::BTreeMap;

use heating_emissions_census_models::{BuildingAge, CategoryCounts, CellId, EnergySource, GridCell};
use heating_emissions_database::census_db;
use heating_emissions_spatial::BoundingBox;

use crate::CensusError;

/// Read access to the five census tables.
///
/// Per-cell lookups return only the cells present in the table; `NULL`
/// values are `None`.
pub trait CensusTables {
    /// Grid cells whose centroid lies in the bounding box.
    ///
    /// # Errors
    ///
    /// Returns [`CensusError`] if the lookup fails.
    fn grid_cells_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<GridCell>, CensusError>;

    /// Resident population.
    ///
    /// # Errors
    ///
    /// Returns [`CensusError`] if the lookup fails.
    fn population(&self, ids: &[CellId]) -> Result<BTreeMap<CellId, Option<f64>>, CensusError>;

    /// Average living space per person (m²).
    ///
    /// # Errors
    ///
    /// Returns [`CensusError`] if the lookup fails.
    fn living_space(&self, ids: &[CellId]) -> Result<BTreeMap<CellId, Option<f64>>, CensusError>;

    /// Residential building counts per construction period.
    ///
    /// # Errors
    ///
    /// Returns [`CensusError`] if the lookup fails.
    fn building_ages(
        &self,
        ids: &[CellId],
    ) -> Result<BTreeMap<CellId, CategoryCounts<BuildingAge>>, CensusError>;

    /// Residential building counts per heating energy source.
    ///
    /// # Errors
    ///
    /// Returns [`CensusError`] if the lookup fails.
    fn energy_sources(
        &self,
        ids: &[CellId],
    ) -> Result<BTreeMap<CellId, CategoryCounts<EnergySource>>, CensusError>;
}

impl CensusTables for duckdb::Connection {
    fn grid_cells_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<GridCell>, CensusError> {
        Ok(census_db::query_grid_in_bbox(
            self, bbox.west, bbox.south, bbox.east, bbox.north,
        )?)
    }

    fn population(&self, ids: &[CellId]) -> Result<BTreeMap<CellId, Option<f64>>, CensusError> {
        Ok(census_db::query_scalar(
            self,
            census_db::POPULATION_TABLE,
            census_db::POPULATION_COLUMN,
            ids,
        )?)
    }

    fn living_space(&self, ids: &[CellId]) -> Result<BTreeMap<CellId, Option<f64>>, CensusError> {
        Ok(census_db::query_scalar(
            self,
            census_db::LIVING_SPACE_TABLE,
            census_db::LIVING_SPACE_COLUMN,
            ids,
        )?)
    }

    fn building_ages(
        &self,
        ids: &[CellId],
    ) -> Result<BTreeMap<CellId, CategoryCounts<BuildingAge>>, CensusError> {
        Ok(census_db::query_category_counts(
            self,
            census_db::BUILDING_AGE_TABLE,
            ids,
        )?)
    }

    fn energy_sources(
        &self,
        ids: &[CellId],
    ) -> Result<BTreeMap<CellId, CategoryCounts<EnergySource>>, CensusError> {
        Ok(census_db::query_category_counts(
            self,
            census_db::HEATING_SOURCE_TABLE,
            ids,
        )?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use heating_emissions_spatial::Aoi;

    use super::*;

    /// In-memory census store.
    #[derive(Default)]
    pub struct FakeTables {
        pub grid: Vec<GridCell>,
        pub population: BTreeMap<CellId, Option<f64>>,
        pub living_space: BTreeMap<CellId, Option<f64>>,
        pub ages: BTreeMap<CellId, CategoryCounts<BuildingAge>>,
        pub sources: BTreeMap<CellId, CategoryCounts<EnergySource>>,
    }

    fn subset<V: Clone>(map: &BTreeMap<CellId, V>, ids: &[CellId]) -> BTreeMap<CellId, V> {
        ids.iter()
            .filter_map(|id| map.get(id).map(|v| (id.clone(), v.clone())))
            .collect()
    }

    impl CensusTables for FakeTables {
        fn grid_cells_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<GridCell>, CensusError> {
            Ok(self
                .grid
                .iter()
                .filter(|c| {
                    (bbox.west..=bbox.east).contains(&c.longitude)
                        && (bbox.south..=bbox.north).contains(&c.latitude)
                })
                .cloned()
                .collect())
        }

        fn population(
            &self,
            ids: &[CellId],
        ) -> Result<BTreeMap<CellId, Option<f64>>, CensusError> {
            Ok(subset(&self.population, ids))
        }

        fn living_space(
            &self,
            ids: &[CellId],
        ) -> Result<BTreeMap<CellId, Option<f64>>, CensusError> {
            Ok(subset(&self.living_space, ids))
        }

        fn building_ages(
            &self,
            ids: &[CellId],
        ) -> Result<BTreeMap<CellId, CategoryCounts<BuildingAge>>, CensusError> {
            Ok(subset(&self.ages, ids))
        }

        fn energy_sources(
            &self,
            ids: &[CellId],
        ) -> Result<BTreeMap<CellId, CategoryCounts<EnergySource>>, CensusError> {
            Ok(subset(&self.sources, ids))
        }
    }

    pub fn cell(id: &str, lon: f64, lat: f64) -> GridCell {
        GridCell {
            id: id.to_string(),
            longitude: lon,
            latitude: lat,
            x_mp_100m: 0,
            y_mp_100m: 0,
        }
    }

    pub fn square_aoi() -> Aoi {
        Aoi::from_geojson_str(
            "Test area",
            r#"{"type": "Polygon", "coordinates": [[[12.3, 48.22], [12.48, 48.22], [12.48, 48.34], [12.3, 48.34], [12.3, 48.22]]]}"#,
        )
        .unwrap()
    }

    #[test]
    fn fake_lookup_returns_only_present_rows() {
        let mut tables = FakeTables::default();
        tables.population.insert("a".into(), Some(1.0));
        let rows = tables
            .population(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
