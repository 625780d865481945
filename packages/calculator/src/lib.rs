#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Emissions Calculator.
//!
//! Turns cleaned census cells into heated area and yearly CO2 emissions
//! (kg CO2 per year), and summarises the AOI distribution of the inputs.

pub mod summary;

use heating_emissions_census_models::{CalculatedCell, CellId, CensusTable};
use serde::{Deserialize, Serialize};

pub use summary::{AoiSummary, Histogram, HistogramBin};

/// Yearly heating emissions of one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsRecord {
    /// Raster cell identifier.
    pub id: CellId,
    /// Cell centroid longitude.
    pub longitude: f64,
    /// Cell centroid latitude.
    pub latitude: f64,
    /// Resident population.
    pub population: f64,
    /// Living space per person (m²), after imputation.
    pub living_space: f64,
    /// Heat consumption rate (kWh/m²/year), after imputation.
    pub heat_consumption: f64,
    /// Emission factor (kg CO2/kWh), after imputation.
    pub emission_factor: f64,
    /// Population × living space (m²).
    pub heated_area: f64,
    /// kg CO2 per year.
    pub co2_emissions: f64,
    /// kg CO2 per person per year.
    pub co2_emissions_per_capita: f64,
}

impl EmissionsRecord {
    /// Copy with the emission and area columns rounded to whole units.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            heated_area: self.heated_area.round(),
            co2_emissions: self.co2_emissions.round(),
            co2_emissions_per_capita: self.co2_emissions_per_capita.round(),
            ..self.clone()
        }
    }
}

/// Mean of the finite values, or `None` if there are none.
fn finite_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0u32), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / f64::from(count))
}

fn impute(value: Option<f64>, mean: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(mean)
}

/// Computes yearly emissions for every cell.
///
/// Missing living space and any non-finite consumption rate or emission
/// factor are replaced by the AOI mean of that column before the formulas
/// are applied:
///
/// * heated area = population × living space
/// * emissions = heated area × consumption × factor
/// * per capita = living space × consumption × factor
///
/// The input is only borrowed, so calling this twice gives the same result.
#[must_use]
pub fn calculate_heating_emissions(
    census: &CensusTable<CalculatedCell>,
) -> CensusTable<EmissionsRecord> {
    let living_space_mean =
        finite_mean(census.values().filter_map(|c| c.living_space)).unwrap_or(0.0);
    let consumption_mean = finite_mean(census.values().map(|c| c.heat_consumption)).unwrap_or(0.0);
    let factor_mean = finite_mean(census.values().map(|c| c.emission_factor)).unwrap_or(0.0);

    log::debug!(
        "Imputation means: living space {living_space_mean:.2}, consumption {consumption_mean:.2}, factor {factor_mean:.5}"
    );

    census.map(|id, c| {
        let living_space = impute(c.living_space, living_space_mean);
        let heat_consumption = impute(Some(c.heat_consumption), consumption_mean);
        let emission_factor = impute(Some(c.emission_factor), factor_mean);
        let population = if c.population.is_finite() { c.population } else { 0.0 };

        let heated_area = population * living_space;
        EmissionsRecord {
            id: id.clone(),
            longitude: c.cell.longitude,
            latitude: c.cell.latitude,
            population,
            living_space,
            heat_consumption,
            emission_factor,
            heated_area,
            co2_emissions: heated_area * heat_consumption * emission_factor,
            co2_emissions_per_capita: living_space * heat_consumption * emission_factor,
        }
    })
}

/// Sum of absolute emissions over the AOI (kg CO2/year).
#[must_use]
pub fn total_emissions(result: &CensusTable<EmissionsRecord>) -> f64 {
    result.values().map(|r| r.co2_emissions).sum()
}

#[cfg(test)]
mod tests {
    use heating_emissions_census_models::GridCell;

    use super::*;

    fn cell(
        id: &str,
        population: f64,
        living_space: Option<f64>,
        rate: f64,
        factor: f64,
    ) -> (CellId, CalculatedCell) {
        (
            id.to_string(),
            CalculatedCell {
                cell: GridCell {
                    id: id.to_string(),
                    longitude: 12.4,
                    latitude: 48.3,
                    x_mp_100m: 0,
                    y_mp_100m: 0,
                },
                population,
                living_space,
                heat_consumption: rate,
                emission_factor: factor,
            },
        )
    }

    #[test]
    fn applies_formulas() {
        let census: CensusTable<_> = [cell("a", 31.0, Some(40.0), 65.0, 0.2)].into_iter().collect();
        let result = calculate_heating_emissions(&census);
        let a = result.get("a").unwrap();
        assert!((a.heated_area - 1240.0).abs() < 1e-9);
        assert!((a.co2_emissions_per_capita - 520.0).abs() < 1e-9);
        assert!((a.co2_emissions - 16_120.0).abs() < 1e-6);
    }

    #[test]
    fn missing_living_space_uses_aoi_mean() {
        let census: CensusTable<_> = [
            cell("a", 2.0, None, 100.0, 0.2),
            cell("b", 1.0, Some(80.0), 100.0, 0.2),
            cell("c", 1.0, Some(75.0), 100.0, 0.2),
        ]
        .into_iter()
        .collect();
        let result = calculate_heating_emissions(&census);
        let a = result.get("a").unwrap();
        assert!((a.living_space - 77.5).abs() < 1e-9);
        assert!((a.co2_emissions - 2.0 * 77.5 * 100.0 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn non_finite_rate_uses_aoi_mean() {
        let census: CensusTable<_> = [
            cell("a", 1.0, Some(10.0), f64::NAN, f64::NAN),
            cell("b", 1.0, Some(10.0), 120.0, 0.3),
        ]
        .into_iter()
        .collect();
        let result = calculate_heating_emissions(&census);
        let a = result.get("a").unwrap();
        assert!((a.heat_consumption - 120.0).abs() < 1e-9);
        assert!((a.emission_factor - 0.3).abs() < 1e-12);
    }

    #[test]
    fn is_idempotent() {
        let census: CensusTable<_> = [
            cell("a", 3.0, None, 130.0, 0.25),
            cell("b", 5.0, Some(42.0), 90.0, 0.0),
        ]
        .into_iter()
        .collect();
        let once = calculate_heating_emissions(&census);
        let twice = calculate_heating_emissions(&census);
        assert_eq!(once, twice);
    }

    #[test]
    fn rounding_only_affects_outputs() {
        let census: CensusTable<_> = [cell("a", 1.0, Some(33.3), 101.1, 0.2)].into_iter().collect();
        let record = calculate_heating_emissions(&census).get("a").unwrap().rounded();
        assert!((record.co2_emissions_per_capita - 673.0).abs() < f64::EPSILON);
        assert!((record.living_space - 33.3).abs() < f64::EPSILON);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "a");
    }

    #[test]
    fn total_sums_cells() {
        let census: CensusTable<_> = [
            cell("a", 1.0, Some(10.0), 100.0, 0.1),
            cell("b", 2.0, Some(10.0), 100.0, 0.1),
        ]
        .into_iter()
        .collect();
        assert!((total_emissions(&calculate_heating_emissions(&census)) - 300.0).abs() < 1e-9);
    }
}
