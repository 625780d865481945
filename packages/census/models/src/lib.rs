#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census grid cell and category distribution types.
//!
//! The German 2022 census publishes residential statistics on a 100 m grid.
//! Every table is keyed by the same raster cell identifier, so the types in
//! this crate are all indexed by [`CellId`]. Categorical tables (building
//! ages, heating energy sources) are modelled as [`CategoryCounts`] over a
//! fixed, ordered [`Category`] enum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Stable 100 m raster cell identifier (e.g. `"CRS3035RES100mN2691700E4341100"`).
pub type CellId = String;

/// Label used when a cell has no count in any true category.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// A 100 m census grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Raster cell identifier.
    pub id: CellId,
    /// Cell centroid longitude (WGS84).
    pub longitude: f64,
    /// Cell centroid latitude (WGS84).
    pub latitude: f64,
    /// Cell centroid easting in EPSG:3035.
    pub x_mp_100m: i64,
    /// Cell centroid northing in EPSG:3035.
    pub y_mp_100m: i64,
}

/// A closed set of census categories with a reserved "unknown" bucket.
///
/// `KNOWN` is ordered: it is the order used for tie-breaking when picking
/// the dominant category of a cell (first maximum wins).
pub trait Category: Copy + Ord + std::fmt::Debug + 'static {
    /// True categories, in priority order. Excludes [`Category::UNKNOWN`].
    const KNOWN: &'static [Self];

    /// The reserved "unknown" bucket.
    const UNKNOWN: Self;

    /// Column name in the census table.
    fn column(self) -> &'static str;

    /// Human-readable label for display.
    fn label(self) -> &'static str;

    /// Per-category coefficient (consumption rate or emission factor).
    fn coefficient(self) -> f64;

    /// All categories including the unknown bucket.
    fn all() -> impl Iterator<Item = Self> {
        Self::KNOWN
            .iter()
            .copied()
            .chain(std::iter::once(Self::UNKNOWN))
    }
}

/// Building construction period brackets.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
pub enum BuildingAge {
    /// Built before 1919.
    #[strum(serialize = "pre_1919")]
    #[serde(rename = "pre_1919")]
    Pre1919,
    /// Built 1919-1948.
    #[strum(serialize = "1919_1948")]
    #[serde(rename = "1919_1948")]
    From1919To1948,
    /// Built 1949-1978.
    #[strum(serialize = "1949_1978")]
    #[serde(rename = "1949_1978")]
    From1949To1978,
    /// Built 1979-1990.
    #[strum(serialize = "1979_1990")]
    #[serde(rename = "1979_1990")]
    From1979To1990,
    /// Built 1991-2000.
    #[strum(serialize = "1991_2000")]
    #[serde(rename = "1991_2000")]
    From1991To2000,
    /// Built 2001-2010.
    #[strum(serialize = "2001_2010")]
    #[serde(rename = "2001_2010")]
    From2001To2010,
    /// Built 2011-2019.
    #[strum(serialize = "2011_2019")]
    #[serde(rename = "2011_2019")]
    From2011To2019,
    /// Built 2020 or later.
    #[strum(serialize = "post_2020")]
    #[serde(rename = "post_2020")]
    Post2020,
    /// Construction period not recorded.
    #[strum(serialize = "unknown")]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Category for BuildingAge {
    const KNOWN: &'static [Self] = &[
        Self::Pre1919,
        Self::From1919To1948,
        Self::From1949To1978,
        Self::From1979To1990,
        Self::From1991To2000,
        Self::From2001To2010,
        Self::From2011To2019,
        Self::Post2020,
    ];

    const UNKNOWN: Self = Self::Unknown;

    fn column(self) -> &'static str {
        self.into()
    }

    fn label(self) -> &'static str {
        match self {
            Self::Pre1919 => "pre-1919",
            Self::From1919To1948 => "1919-1948",
            Self::From1949To1978 => "1949-1978",
            Self::From1979To1990 => "1979-1990",
            Self::From1991To2000 => "1991-2000",
            Self::From2001To2010 => "2001-2010",
            Self::From2011To2019 => "2011-2019",
            Self::Post2020 => "post-2020",
            Self::Unknown => UNKNOWN_LABEL,
        }
    }

    /// Heat consumption in kWh per m² of living space per year.
    ///
    /// Source: <https://www.wohngebaeude.info/daten/#/heizen/bundesweit>
    fn coefficient(self) -> f64 {
        match self {
            Self::Pre1919 | Self::From1919To1948 => 134.6,
            Self::From1949To1978 => 135.7,
            Self::From1979To1990 => 126.2,
            Self::From1991To2000 => 93.3,
            Self::From2001To2010 => 78.5,
            Self::From2011To2019 | Self::Post2020 => 74.1,
            Self::Unknown => 126.7,
        }
    }
}

/// Primary heating energy source of residential buildings.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnergySource {
    /// Natural gas.
    Gas,
    /// Heating oil.
    HeatingOil,
    /// Wood and wood pellets.
    Wood,
    /// Biomass and biogas.
    BiomassBiogas,
    /// Solar thermal, geothermal and heat pumps.
    SolarGeothermalHeatPumps,
    /// Direct electric heating.
    Electricity,
    /// Coal.
    Coal,
    /// District heating.
    DistrictHeating,
    /// Energy source not recorded.
    Unknown,
}

impl Category for EnergySource {
    const KNOWN: &'static [Self] = &[
        Self::Gas,
        Self::HeatingOil,
        Self::Wood,
        Self::BiomassBiogas,
        Self::SolarGeothermalHeatPumps,
        Self::Electricity,
        Self::Coal,
        Self::DistrictHeating,
    ];

    const UNKNOWN: Self = Self::Unknown;

    fn column(self) -> &'static str {
        self.into()
    }

    fn label(self) -> &'static str {
        match self {
            Self::Gas => "Gas",
            Self::HeatingOil => "Heating oil",
            Self::Wood => "Wood",
            Self::BiomassBiogas => "Biomass / biogas",
            Self::SolarGeothermalHeatPumps => "Solar / geothermal / heat pumps",
            Self::Electricity => "Electricity",
            Self::Coal => "Coal",
            Self::DistrictHeating => "District heating",
            Self::Unknown => UNKNOWN_LABEL,
        }
    }

    /// Emission factor in kg CO2 per kWh of heat.
    ///
    /// Scope 1 only: electricity, district heating and heat pumps emit
    /// nothing on site.
    fn coefficient(self) -> f64 {
        match self {
            Self::Gas | Self::BiomassBiogas => 0.200_29,
            Self::HeatingOil => 0.267_39,
            Self::Wood => 0.34,
            Self::SolarGeothermalHeatPumps | Self::Electricity | Self::DistrictHeating => 0.0,
            Self::Coal => 0.336_61,
            Self::Unknown => 0.195_34,
        }
    }
}

/// Per-cell counts of buildings in each category.
///
/// Categories never set (or set to `None`) count as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCounts<C: Category> {
    counts: BTreeMap<C, f64>,
}

impl<C: Category> Default for CategoryCounts<C> {
    fn default() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }
}

impl<C: Category> CategoryCounts<C> {
    /// Creates an empty (all-zero) distribution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the count for `category`. Missing and non-finite values become 0.
    pub fn set(&mut self, category: C, count: Option<f64>) {
        let value = count.filter(|c| c.is_finite()).unwrap_or(0.0);
        self.counts.insert(category, value);
    }

    /// Builder-style [`CategoryCounts::set`].
    #[must_use]
    pub fn with(mut self, category: C, count: f64) -> Self {
        self.set(category, Some(count));
        self
    }

    /// Count for `category` (0 if never set).
    #[must_use]
    pub fn get(&self, category: C) -> f64 {
        self.counts.get(&category).copied().unwrap_or(0.0)
    }

    /// Sum of counts over the true categories, excluding the unknown bucket.
    #[must_use]
    pub fn known_total(&self) -> f64 {
        C::KNOWN.iter().map(|c| self.get(*c)).sum()
    }

    /// Count-weighted average of the category coefficients.
    ///
    /// The unknown bucket is excluded from both numerator and denominator.
    /// Returns `None` when the known total is zero.
    #[must_use]
    pub fn weighted_coefficient(&self) -> Option<f64> {
        let total = self.known_total();
        if total <= 0.0 {
            return None;
        }
        Some(
            C::KNOWN
                .iter()
                .map(|c| c.coefficient() * (self.get(*c) / total))
                .sum(),
        )
    }

    /// Category with the highest count among true categories.
    ///
    /// Ties resolve to the first category in [`Category::KNOWN`] order.
    /// Returns `None` if every true category is zero.
    #[must_use]
    pub fn dominant(&self) -> Option<C> {
        let mut best: Option<(C, f64)> = None;
        for category in C::KNOWN {
            let count = self.get(*category);
            if count <= 0.0 {
                continue;
            }
            match best {
                Some((_, current)) if count <= current => {}
                _ => best = Some((*category, count)),
            }
        }
        best.map(|(c, _)| c)
    }

    /// Display label of [`CategoryCounts::dominant`], or `"Unknown"`.
    #[must_use]
    pub fn dominant_label(&self) -> &'static str {
        self.dominant().map_or(UNKNOWN_LABEL, Category::label)
    }
}

/// Which dominant characteristic of a cell to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DominantCharacteristic {
    /// Dominant building construction period.
    DominantAge,
    /// Dominant heating energy source.
    DominantEnergy,
}

/// A cell with derived scalar features, ready for the emissions formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedCell {
    /// Grid geometry and identifier.
    pub cell: GridCell,
    /// Resident population.
    pub population: f64,
    /// Average living space per person (m²). `None` if the cell is absent
    /// from the living-space table.
    pub living_space: Option<f64>,
    /// Heat consumption rate (kWh/m²/year).
    pub heat_consumption: f64,
    /// Emission factor (kg CO2/kWh).
    pub emission_factor: f64,
}

/// A cell with its dominant category labels, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncalculatedCell {
    /// Raster cell identifier.
    pub id: CellId,
    /// Dominant building age label (`"Unknown"` when no data).
    pub dominant_age: String,
    /// Dominant energy source label (`"Unknown"` when no data).
    pub dominant_energy: String,
}

/// Rows indexed by [`CellId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensusTable<T> {
    rows: BTreeMap<CellId, T>,
}

impl<T> Default for CensusTable<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T> CensusTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the row for `id`.
    pub fn insert(&mut self, id: CellId, row: T) {
        self.rows.insert(id, row);
    }

    /// Row for `id`, if present.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.rows.get(id)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell identifiers in index order.
    pub fn ids(&self) -> impl Iterator<Item = &CellId> {
        self.rows.keys()
    }

    /// Rows in index order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    /// `(id, row)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&CellId, &T)> {
        self.rows.iter()
    }

    /// Whether both tables are indexed by exactly the same cell IDs.
    #[must_use]
    pub fn same_index<U>(&self, other: &CensusTable<U>) -> bool {
        self.rows.len() == other.rows.len() && self.ids().eq(other.ids())
    }

    /// Builds a new table with the same index by transforming every row.
    #[must_use]
    pub fn map<U>(&self, mut f: impl FnMut(&CellId, &T) -> U) -> CensusTable<U> {
        CensusTable {
            rows: self
                .rows
                .iter()
                .map(|(id, row)| (id.clone(), f(id, row)))
                .collect(),
        }
    }
}

impl<T> FromIterator<(CellId, T)> for CensusTable<T> {
    fn from_iter<I: IntoIterator<Item = (CellId, T)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for CensusTable<T> {
    type Item = (CellId, T);
    type IntoIter = std::collections::btree_map::IntoIter<CellId, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_age_single_bracket() {
        let counts = CategoryCounts::new().with(BuildingAge::Pre1919, 5.0);
        assert_eq!(counts.dominant(), Some(BuildingAge::Pre1919));
        assert_eq!(counts.dominant_label(), "pre-1919");
    }

    #[test]
    fn dominant_all_zero_is_unknown() {
        let counts: CategoryCounts<BuildingAge> = CategoryCounts::new()
            .with(BuildingAge::Pre1919, 0.0)
            .with(BuildingAge::Unknown, 12.0);
        assert_eq!(counts.dominant(), None);
        assert_eq!(counts.dominant_label(), "Unknown");
    }

    #[test]
    fn dominant_tie_picks_first_in_order() {
        let counts = CategoryCounts::new()
            .with(EnergySource::Coal, 4.0)
            .with(EnergySource::HeatingOil, 4.0)
            .with(EnergySource::Wood, 1.0);
        assert_eq!(counts.dominant(), Some(EnergySource::HeatingOil));
    }

    #[test]
    fn weighted_coefficient_excludes_unknown() {
        let counts = CategoryCounts::new()
            .with(EnergySource::Gas, 1.0)
            .with(EnergySource::Electricity, 1.0)
            .with(EnergySource::Unknown, 100.0);
        let factor = counts.weighted_coefficient().unwrap();
        assert!((factor - 0.200_29 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn weighted_coefficient_zero_total_is_none() {
        let counts: CategoryCounts<BuildingAge> =
            CategoryCounts::new().with(BuildingAge::Unknown, 3.0);
        assert!(counts.weighted_coefficient().is_none());
    }

    #[test]
    fn missing_counts_are_zero() {
        let mut counts: CategoryCounts<BuildingAge> = CategoryCounts::new();
        counts.set(BuildingAge::Post2020, None);
        counts.set(BuildingAge::From1991To2000, Some(f64::NAN));
        assert!(counts.known_total().abs() < f64::EPSILON);
    }

    #[test]
    fn column_names_match_census_tables() {
        assert_eq!(BuildingAge::Pre1919.column(), "pre_1919");
        assert_eq!(BuildingAge::From1919To1948.column(), "1919_1948");
        assert_eq!(EnergySource::SolarGeothermalHeatPumps.column(), "solar_geothermal_heat_pumps");
        assert_eq!(EnergySource::DistrictHeating.column(), "district_heating");
        assert_eq!("heating_oil".parse::<EnergySource>().unwrap(), EnergySource::HeatingOil);
    }

    #[test]
    fn characteristic_keys_parse() {
        assert_eq!(
            "dominant_energy".parse::<DominantCharacteristic>().unwrap(),
            DominantCharacteristic::DominantEnergy
        );
        assert!("dominant_height".parse::<DominantCharacteristic>().is_err());
    }

    #[test]
    fn same_index_compares_ids() {
        let a: CensusTable<u8> = [("a".to_string(), 1), ("b".to_string(), 2)]
            .into_iter()
            .collect();
        let b = a.map(|_, v| f64::from(*v));
        assert!(a.same_index(&b));
        let c: CensusTable<u8> = [("a".to_string(), 1)].into_iter().collect();
        assert!(!a.same_index(&c));
    }
}
