//! Grid Resolver: AOI polygon to census grid cells.

use heating_emissions_census_models::{CensusTable, GridCell};
use heating_emissions_spatial::Aoi;

use crate::{CensusError, CensusTables};

/// Returns every grid cell whose centroid lies inside the AOI, indexed by
/// cell ID.
///
/// The store is asked for the AOI's bounding box first; only those
/// candidates are tested against the polygon.
///
/// # Errors
///
/// Returns [`CensusError::NoData`] if no cell lies inside the AOI, or a
/// database/geometry error if the lookup fails.
pub fn resolve_grid(
    tables: &impl CensusTables,
    aoi: &Aoi,
) -> Result<CensusTable<GridCell>, CensusError> {
    log::info!("Querying census grid points within {}", aoi.name);

    let bbox = aoi.bounding_box()?;
    let candidates = tables.grid_cells_in_bbox(&bbox)?;
    let candidate_count = candidates.len();

    let grid: CensusTable<GridCell> = candidates
        .into_iter()
        .filter(|cell| aoi.contains_point(cell.longitude, cell.latitude))
        .map(|cell| (cell.id.clone(), cell))
        .collect();

    if grid.is_empty() {
        return Err(CensusError::NoData);
    }

    log::debug!(
        "Found {} points within the AOI ({candidate_count} in bounding box)",
        grid.len()
    );

    Ok(grid)
}
