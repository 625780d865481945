#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Weather reanalysis types.
//!
//! Covers the retrieval request sent to the climate data store, the raw
//! hourly records read from downloaded archives, the preprocessed samples
//! the demand model consumes, and the resulting hourly heating demand.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Reanalysis dataset queried for hourly single-level fields.
pub const DATASET: &str = "reanalysis-era5-single-levels";

/// Coordinate reference of every [`WeatherDataset`].
pub const WEATHER_CRS: &str = "EPSG:4326";

/// Variables requested from the reanalysis, by their request name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
pub enum ReanalysisVariable {
    /// Air temperature at 2 m (K).
    #[strum(serialize = "2m_temperature")]
    Temperature2m,
    /// Dew point at 2 m (K).
    #[strum(serialize = "2m_dewpoint_temperature")]
    DewPoint2m,
    /// Surface pressure (Pa).
    #[strum(serialize = "surface_pressure")]
    SurfacePressure,
    /// Eastward wind at 10 m (m/s).
    #[strum(serialize = "10m_u_component_of_wind")]
    WindU10m,
    /// Northward wind at 10 m (m/s).
    #[strum(serialize = "10m_v_component_of_wind")]
    WindV10m,
    /// Hourly accumulated downward solar radiation (J/m²).
    #[strum(serialize = "surface_solar_radiation_downwards")]
    SolarRadiation,
}

impl ReanalysisVariable {
    /// Short name used as the column header in downloaded files.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::Temperature2m => "t2m",
            Self::DewPoint2m => "d2m",
            Self::SurfacePressure => "sp",
            Self::WindU10m => "u10",
            Self::WindV10m => "v10",
            Self::SolarRadiation => "ssrd",
        }
    }

    /// Looks a variable up by its short name.
    #[must_use]
    pub fn from_short_name(name: &str) -> Option<Self> {
        Self::iter().find(|v| v.short_name() == name)
    }

    /// Request names of every variable.
    #[must_use]
    pub fn request_names() -> Vec<String> {
        Self::iter().map(|v| v.to_string()).collect()
    }
}

/// Body of one monthly retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Always `["reanalysis"]`.
    pub product_type: Vec<String>,
    /// File format of the individual fields.
    pub data_format: String,
    /// Packaging of the result; `zip` because fields may span several files.
    pub download_format: String,
    /// Variable request names.
    pub variable: Vec<String>,
    /// Requested year.
    pub year: Vec<String>,
    /// Requested month.
    pub month: Vec<String>,
    /// Days `01` to `31`.
    pub day: Vec<String>,
    /// Hours `00:00` to `23:00`.
    pub time: Vec<String>,
    /// `[north, west, south, east]` in degrees.
    pub area: [f64; 4],
}

impl RetrievalRequest {
    /// Request for every variable, day and hour of one month.
    #[must_use]
    pub fn monthly(year: i32, month: u32, area: [f64; 4]) -> Self {
        Self {
            product_type: vec!["reanalysis".to_string()],
            data_format: "netcdf".to_string(),
            download_format: "zip".to_string(),
            variable: ReanalysisVariable::request_names(),
            year: vec![year.to_string()],
            month: vec![month.to_string()],
            day: (1..=31).map(|d| format!("{d:02}")).collect(),
            time: (0..24).map(|h| format!("{h:02}:00")).collect(),
            area,
        }
    }
}

/// A reanalysis grid point, keyed by micro-degree coordinates so it can be
/// compared and used as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeatherPoint {
    lat_e6: i64,
    lon_e6: i64,
}

impl WeatherPoint {
    /// Creates a point from degrees (rounded to 1e-6°).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_e6: (latitude * 1e6).round() as i64,
            lon_e6: (longitude * 1e6).round() as i64,
        }
    }

    /// Latitude in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn latitude(self) -> f64 {
        self.lat_e6 as f64 / 1e6
    }

    /// Longitude in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn longitude(self) -> f64 {
        self.lon_e6 as f64 / 1e6
    }
}

/// One hourly record as read from an archive, in source units.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Valid time (UTC).
    pub time: NaiveDateTime,
    /// Grid point.
    pub point: WeatherPoint,
    /// 2 m temperature (K).
    pub t2m: f64,
    /// 2 m dew point (K).
    pub d2m: f64,
    /// Surface pressure (Pa).
    pub sp: f64,
    /// 10 m eastward wind (m/s).
    pub u10: f64,
    /// 10 m northward wind (m/s).
    pub v10: f64,
    /// Hourly accumulated downward solar radiation (J/m²).
    pub ssrd: f64,
}

/// One hourly record in the units the demand model expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    /// Valid time (UTC).
    pub time: NaiveDateTime,
    /// Grid point.
    pub point: WeatherPoint,
    /// Air temperature (°C).
    pub temperature: f64,
    /// Specific humidity (g/kg).
    pub humidity: f64,
    /// Global horizontal radiation (W/m²).
    pub radiation: f64,
    /// Wind speed (m/s).
    pub wind_speed: f64,
}

/// Preprocessed weather for one archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherDataset {
    /// Coordinate reference, always [`WEATHER_CRS`].
    pub crs: String,
    /// Samples sorted by point then time.
    pub samples: Vec<WeatherSample>,
}

impl WeatherDataset {
    /// Distinct grid points in the dataset.
    #[must_use]
    pub fn points(&self) -> Vec<WeatherPoint> {
        let mut points: Vec<_> = self.samples.iter().map(|s| s.point).collect();
        points.sort_unstable();
        points.dedup();
        points
    }
}

/// Heating demand of one grid point for one hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyDemand {
    /// Valid time (UTC).
    pub time: NaiveDateTime,
    /// Grid point.
    pub point: WeatherPoint,
    /// Heating demand per capita (kWh).
    pub heating_demand: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_names() {
        assert_eq!(ReanalysisVariable::Temperature2m.to_string(), "2m_temperature");
        assert_eq!(ReanalysisVariable::SolarRadiation.short_name(), "ssrd");
        assert_eq!(
            ReanalysisVariable::from_short_name("u10"),
            Some(ReanalysisVariable::WindU10m)
        );
        assert_eq!(ReanalysisVariable::from_short_name("tp"), None);
    }

    #[test]
    fn monthly_request_body() {
        let request = RetrievalRequest::monthly(2022, 3, [48.34, 12.3, 48.22, 12.48]);
        assert_eq!(request.day.len(), 31);
        assert_eq!(request.day[0], "01");
        assert_eq!(request.time.len(), 24);
        assert_eq!(request.time[23], "23:00");
        assert_eq!(request.variable.len(), 6);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["product_type"][0], "reanalysis");
        assert_eq!(json["download_format"], "zip");
        assert_eq!(json["month"][0], "3");
        assert_eq!(json["area"][0], 48.34);
    }

    #[test]
    fn weather_point_is_exact_key() {
        let a = WeatherPoint::new(48.25, 12.5);
        let b = WeatherPoint::new(48.250_000_000_1, 12.499_999_999_9);
        assert_eq!(a, b);
        assert!((a.latitude() - 48.25).abs() < 1e-12);
    }
}
