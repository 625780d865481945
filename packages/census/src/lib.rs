#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census grid resolution and table cleaning.
//!
//! Resolves the 100 m grid cells inside an AOI, fetches the four per-cell
//! census tables for them and derives the scalar features the emissions
//! formula needs. Cleaning never drops a cell: every output table is
//! indexed exactly like the resolved grid.

pub mod clean;
pub mod grid;
pub mod store;

use heating_emissions_census_models::{
    BuildingAge, CalculatedCell, Category, CensusTable, EnergySource,
    UncalculatedCell,
};
use heating_emissions_database::DbError;
use heating_emissions_database::census_db::{
    BUILDING_AGE_TABLE, HEATING_SOURCE_TABLE, LIVING_SPACE_TABLE, POPULATION_TABLE,
};
use heating_emissions_spatial::{Aoi, SpatialError};

pub use grid::resolve_grid;
pub use store::CensusTables;

/// Errors from grid resolution and table cleaning.
#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    /// No grid cell lies inside the AOI.
    #[error(
        "There are no data for residential buildings in the area you selected. Please select an area with residential buildings"
    )]
    NoData,

    /// A census table has no row for any cell of the resolved grid.
    #[error("The census table {table} has no data for the area you selected")]
    MissingTable {
        /// Fully-qualified table name.
        table: String,
    },

    /// A dominant-characteristic key that is not one of the known keys.
    #[error("Unknown dominant characteristic: {key}")]
    UnknownCharacteristic {
        /// The requested key.
        key: String,
    },

    /// Two joined tables are not indexed by the same cells.
    #[error("Table {table} is not indexed like the resolved grid")]
    MisalignedIndex {
        /// Name of the offending table.
        table: String,
    },

    /// Underlying database failure.
    #[error(transparent)]
    Database(#[from] DbError),

    /// AOI geometry failure.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

impl CensusError {
    /// Whether the message should be shown to the end user as-is.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NoData | Self::MissingTable { .. } | Self::UnknownCharacteristic { .. }
        )
    }
}

/// Cleaned census tables for one AOI.
#[derive(Debug, Clone, PartialEq)]
pub struct CensusData {
    /// Scalar features for the emissions formula.
    pub calculated: CensusTable<CalculatedCell>,
    /// Dominant category labels for display.
    pub uncalculated: CensusTable<UncalculatedCell>,
}

/// Resolves the grid for `aoi` and joins and cleans all census tables.
///
/// Both returned tables carry exactly the resolved grid's cell IDs.
///
/// # Errors
///
/// * [`CensusError::NoData`] if the AOI holds no grid cell
/// * [`CensusError::MissingTable`] if a table has no row for any cell
/// * [`CensusError::Database`] if a query fails
pub fn collect_census_data(
    tables: &impl CensusTables,
    aoi: &Aoi,
) -> Result<CensusData, CensusError> {
    let grid = resolve_grid(tables, aoi)?;
    let ids: Vec<_> = grid.ids().cloned().collect();

    log::debug!("Querying {POPULATION_TABLE}");
    let population = require_rows(POPULATION_TABLE, tables.population(&ids)?)?;
    let population = clean::clean_population(&grid, &population);

    log::debug!("Querying {LIVING_SPACE_TABLE}");
    let living_space = require_rows(LIVING_SPACE_TABLE, tables.living_space(&ids)?)?;
    let living_space = clean::clean_living_space(&grid, &living_space);

    log::debug!("Querying {BUILDING_AGE_TABLE}");
    let ages = require_rows(BUILDING_AGE_TABLE, tables.building_ages(&ids)?)?;
    let ages = clean::reindex_counts(&grid, ages);
    let heat_consumption = clean::clean_building_ages(&ages);

    log::debug!("Querying {HEATING_SOURCE_TABLE}");
    let sources = require_rows(HEATING_SOURCE_TABLE, tables.energy_sources(&ids)?)?;
    let sources = clean::reindex_counts(&grid, sources);
    let emission_factor = clean::clean_energy_sources(&sources);

    let dominant_age = clean::dominant_labels(&ages);
    let dominant_energy = clean::dominant_labels(&sources);

    for (name, aligned) in [
        (POPULATION_TABLE, grid.same_index(&population)),
        (LIVING_SPACE_TABLE, grid.same_index(&living_space)),
        (BUILDING_AGE_TABLE, grid.same_index(&heat_consumption)),
        (HEATING_SOURCE_TABLE, grid.same_index(&emission_factor)),
    ] {
        if !aligned {
            return Err(CensusError::MisalignedIndex {
                table: name.to_string(),
            });
        }
    }

    let calculated = grid.map(|id, cell| CalculatedCell {
        cell: cell.clone(),
        population: population.get(id).copied().unwrap_or(0.0),
        living_space: living_space.get(id).copied().flatten(),
        heat_consumption: heat_consumption
            .get(id)
            .copied()
            .unwrap_or_else(|| BuildingAge::UNKNOWN.coefficient()),
        emission_factor: emission_factor
            .get(id)
            .copied()
            .unwrap_or_else(|| EnergySource::UNKNOWN.coefficient()),
    });

    let uncalculated = grid.map(|id, _| UncalculatedCell {
        id: id.clone(),
        dominant_age: dominant_age.get(id).cloned().unwrap_or_default(),
        dominant_energy: dominant_energy.get(id).cloned().unwrap_or_default(),
    });

    log::info!("Collected census data for {} cells", calculated.len());

    Ok(CensusData {
        calculated,
        uncalculated,
    })
}

fn require_rows<V>(
    table: &str,
    rows: std::collections::BTreeMap<String, V>,
) -> Result<std::collections::BTreeMap<String, V>, CensusError> {
    if rows.is_empty() {
        return Err(CensusError::MissingTable {
            table: table.to_string(),
        });
    }
    Ok(rows)
}
