//! Unit conversions from raw reanalysis fields to demand-model inputs.

use heating_emissions_weather_models::{RawSample, WEATHER_CRS, WeatherDataset, WeatherSample};

/// Saturation vapour pressure coefficient a1 (Pa), Buck 1981 over water.
const A1: f64 = 611.21;
/// Coefficient a3.
const A3: f64 = 17.502;
/// Coefficient a4 (K).
const A4: f64 = 32.19;
/// Triple point of water (K).
const T0: f64 = 273.16;
/// Ratio of the gas constants of dry air and water vapour.
const EPS: f64 = 0.621_981;

/// Specific humidity (kg/kg) from dew point (K) and surface pressure (Pa).
#[must_use]
pub fn specific_humidity(dew_point_k: f64, pressure_pa: f64) -> f64 {
    let saturation = A1 * (A3 * (dew_point_k - T0) / (dew_point_k - A4)).exp();
    EPS * saturation / (1.0 - EPS).mul_add(-saturation, pressure_pa)
}

/// Kelvin to degrees Celsius.
#[must_use]
pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.15
}

/// Hourly accumulated energy (J/m²) to mean power (W/m²).
#[must_use]
pub fn accumulated_to_power(joules_per_m2: f64) -> f64 {
    joules_per_m2 / 3600.0
}

/// Wind speed from its two horizontal components.
#[must_use]
pub fn wind_speed(u: f64, v: f64) -> f64 {
    u.hypot(v)
}

/// Converts one raw record.
#[must_use]
pub fn preprocess_sample(raw: &RawSample) -> WeatherSample {
    WeatherSample {
        time: raw.time,
        point: raw.point,
        temperature: kelvin_to_celsius(raw.t2m),
        humidity: specific_humidity(raw.d2m, raw.sp) * 1000.0,
        radiation: accumulated_to_power(raw.ssrd),
        wind_speed: wind_speed(raw.u10, raw.v10),
    }
}

/// Converts raw records into a dataset sorted by point then time.
#[must_use]
pub fn preprocess(raw: &[RawSample]) -> WeatherDataset {
    let mut samples: Vec<WeatherSample> = raw.iter().map(preprocess_sample).collect();
    samples.sort_by(|a, b| a.point.cmp(&b.point).then(a.time.cmp(&b.time)));

    WeatherDataset {
        crs: WEATHER_CRS.to_string(),
        samples,
    }
}
