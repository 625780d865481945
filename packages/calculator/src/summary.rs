//! AOI distribution summaries of the emissions inputs and outputs.

use heating_emissions_census_models::CensusTable;
use serde::{Deserialize, Serialize};

use crate::EmissionsRecord;

/// Number of histogram bins.
pub const HISTOGRAM_BINS: usize = 20;

/// German average residential heating emissions per person (t CO2/year).
pub const GERMAN_PER_CAPITA_TONNES: f64 = 2.2;

/// German average heating energy consumption (kWh/m²/year).
pub const GERMAN_HEAT_CONSUMPTION: f64 = 127.1;

/// One histogram bin with the share of cells that fall into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Inclusive lower edge.
    pub lower: f64,
    /// Upper edge (inclusive for the last bin).
    pub upper: f64,
    /// Percent of cells in this bin.
    pub percent: f64,
}

/// Percent-of-cells histogram with summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Equal-width bins spanning `[min, max]`.
    pub bins: Vec<HistogramBin>,
    /// Mean over all cells.
    pub mean: f64,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// National reference value, if one is published.
    pub reference: Option<f64>,
}

impl Histogram {
    /// Builds a histogram over the finite values. Returns `None` if there
    /// are none.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_values(values: &[f64], bins: usize, reference: Option<f64>) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() || bins == 0 {
            return None;
        }

        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;

        let width = if max > min { (max - min) / bins as f64 } else { 1.0 };
        let mut counts = vec![0usize; bins];
        for v in &finite {
            let index = (((v - min) / width).floor() as usize).min(bins - 1);
            counts[index] += 1;
        }

        let total = finite.len() as f64;
        let bins = counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| HistogramBin {
                lower: (i as f64).mul_add(width, min),
                upper: ((i + 1) as f64).mul_add(width, min),
                percent: count as f64 / total * 100.0,
            })
            .collect();

        Some(Self {
            bins,
            mean,
            min,
            max,
            reference,
        })
    }
}

/// Distribution summaries shown alongside the gridded result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiSummary {
    /// Number of cells.
    pub cells: usize,
    /// Total emissions (kg CO2/year).
    pub total_co2_emissions: f64,
    /// Per-capita emissions in tonnes per person per year.
    pub per_capita_tonnes: Option<Histogram>,
    /// Heat consumption rate (kWh/m²/year).
    pub heat_consumption: Option<Histogram>,
    /// Emission factor (kg CO2/kWh).
    pub emission_factor: Option<Histogram>,
}

impl AoiSummary {
    /// Summarises a computed emissions table.
    #[must_use]
    pub fn from_result(result: &CensusTable<EmissionsRecord>) -> Self {
        let per_capita: Vec<f64> = result
            .values()
            .map(|r| r.co2_emissions_per_capita / 1e3)
            .collect();
        let consumption: Vec<f64> = result.values().map(|r| r.heat_consumption).collect();
        let factor: Vec<f64> = result.values().map(|r| r.emission_factor).collect();

        Self {
            cells: result.len(),
            total_co2_emissions: crate::total_emissions(result),
            per_capita_tonnes: Histogram::from_values(
                &per_capita,
                HISTOGRAM_BINS,
                Some(GERMAN_PER_CAPITA_TONNES),
            ),
            heat_consumption: Histogram::from_values(
                &consumption,
                HISTOGRAM_BINS,
                Some(GERMAN_HEAT_CONSUMPTION),
            ),
            emission_factor: Histogram::from_values(&factor, HISTOGRAM_BINS, None),
        }
    }

    /// One-line description of the per-capita distribution.
    #[must_use]
    pub fn per_capita_caption(&self) -> Option<String> {
        self.per_capita_tonnes.as_ref().map(|h| {
            format!(
                "Average carbon dioxide emissions from heating residential buildings are {:.2} tonnes per person per year, but range from {:.2} to {:.2} tonnes.",
                h.mean, h.min, h.max
            )
        })
    }

    /// One-line description of the consumption-rate distribution.
    #[must_use]
    pub fn heat_consumption_caption(&self) -> Option<String> {
        self.heat_consumption.as_ref().map(|h| {
            format!(
                "Average heating energy consumption in residential buildings is {:.2} kWh per square meter per year, but range from {:.2} to {:.2}.",
                h.mean, h.min, h.max
            )
        })
    }

    /// One-line description of the emission-factor distribution.
    #[must_use]
    pub fn emission_factor_caption(&self) -> Option<String> {
        self.emission_factor.as_ref().map(|h| {
            format!(
                "Average emission factor from heating residential buildings is {:.2} kg of carbon dioxide per kWh, but range from {:.2} to {:.2}.",
                h.mean, h.min, h.max
            )
        })
    }
}
