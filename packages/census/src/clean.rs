//! Table Joiner & Cleaner.
//!
//! Each cleaner takes the raw rows of one census table, re-indexes them onto
//! the resolved grid and replaces missing values. Weighted coefficients that
//! cannot be computed for a cell (no known category count) become NaN first
//! and are then replaced by the AOI-wide mean.

use std::collections::BTreeMap;

use heating_emissions_census_models::{
    BuildingAge, Category, CategoryCounts, CellId, CensusTable, DominantCharacteristic,
    EnergySource,
};

use crate::CensusError;

/// Population per cell. Missing rows and `NULL` values become 0.
#[must_use]
pub fn clean_population<T>(
    grid: &CensusTable<T>,
    raw: &BTreeMap<CellId, Option<f64>>,
) -> CensusTable<f64> {
    grid.map(|id, _| raw.get(id).copied().flatten().unwrap_or(0.0))
}

/// Living space per person per cell.
///
/// A `NULL` value in an existing row becomes 0. A cell absent from the
/// table stays `None` so the calculator can impute the AOI mean.
#[must_use]
pub fn clean_living_space<T>(
    grid: &CensusTable<T>,
    raw: &BTreeMap<CellId, Option<f64>>,
) -> CensusTable<Option<f64>> {
    grid.map(|id, _| raw.get(id).map(|value| value.unwrap_or(0.0)))
}

/// Re-indexes category counts onto the grid. Absent cells get all-zero
/// counts.
#[must_use]
pub fn reindex_counts<T, C: Category>(
    grid: &CensusTable<T>,
    mut raw: BTreeMap<CellId, CategoryCounts<C>>,
) -> CensusTable<CategoryCounts<C>> {
    grid.map(|id, _| raw.remove(id).unwrap_or_default())
}

/// Count-weighted coefficient of a cell, or NaN when the cell has no count
/// in any true category.
#[must_use]
pub fn weighted_coefficient<C: Category>(counts: &CategoryCounts<C>) -> f64 {
    counts.weighted_coefficient().unwrap_or(f64::NAN)
}

/// Replaces every non-finite value with the mean of the finite ones.
///
/// If no value is finite, `fallback` is used for every cell.
#[must_use]
pub fn fill_with_mean(values: &CensusTable<f64>, fallback: f64) -> CensusTable<f64> {
    let (sum, count) = values
        .values()
        .filter(|v| v.is_finite())
        .fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));

    let replacement = if count == 0 {
        log::warn!("No cell in the AOI has category data, using fallback {fallback}");
        fallback
    } else {
        sum / f64::from(count)
    };

    values.map(|_, v| if v.is_finite() { *v } else { replacement })
}

/// Heat consumption rate (kWh/m²/year) per cell from building-age counts.
#[must_use]
pub fn clean_building_ages(ages: &CensusTable<CategoryCounts<BuildingAge>>) -> CensusTable<f64> {
    let rates = ages.map(|_, counts| weighted_coefficient(counts));
    fill_with_mean(&rates, BuildingAge::UNKNOWN.coefficient())
}

/// Emission factor (kg CO2/kWh) per cell from energy-source counts.
#[must_use]
pub fn clean_energy_sources(
    sources: &CensusTable<CategoryCounts<EnergySource>>,
) -> CensusTable<f64> {
    let factors = sources.map(|_, counts| weighted_coefficient(counts));
    fill_with_mean(&factors, EnergySource::UNKNOWN.coefficient())
}

/// Dominant category label per cell (`"Unknown"` for all-zero cells).
#[must_use]
pub fn dominant_labels<C: Category>(
    counts: &CensusTable<CategoryCounts<C>>,
) -> CensusTable<String> {
    counts.map(|_, c| c.dominant_label().to_string())
}

/// Dominant labels for the characteristic named by `key`
/// (`"dominant_age"` or `"dominant_energy"`).
///
/// # Errors
///
/// Returns [`CensusError::UnknownCharacteristic`] for any other key.
pub fn dominant_category(
    key: &str,
    ages: &CensusTable<CategoryCounts<BuildingAge>>,
    sources: &CensusTable<CategoryCounts<EnergySource>>,
) -> Result<CensusTable<String>, CensusError> {
    let characteristic: DominantCharacteristic =
        key.parse().map_err(|_| CensusError::UnknownCharacteristic {
            key: key.to_string(),
        })?;

    Ok(match characteristic {
        DominantCharacteristic::DominantAge => dominant_labels(ages),
        DominantCharacteristic::DominantEnergy => dominant_labels(sources),
    })
}
