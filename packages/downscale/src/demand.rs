//! Hourly heating demand from weather.
//!
//! The model works on a building-adjusted internal temperature (BAIT):
//! the daily mean air temperature corrected for how sunny, windy and humid
//! the day feels relative to what is typical at that temperature, smoothed
//! over the two previous days to account for the thermal mass of
//! buildings, and partly blended back towards the raw temperature on warm
//! days. Demand is proportional to how far BAIT falls below the heating
//! threshold.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use heating_emissions_weather_models::{HourlyDemand, WeatherDataset, WeatherPoint, WeatherSample};

/// Comfort temperature the setpoint corrections are applied around (°C).
const SETPOINT_TEMPERATURE: f64 = 16.0;
/// Temperature at which blending of raw temperature into BAIT starts (°C).
const LOWER_BLEND: f64 = 15.0;
/// Temperature at which blending reaches its maximum (°C).
const UPPER_BLEND: f64 = 23.0;
/// Largest share of raw temperature blended into BAIT.
const MAX_RAW_BLEND: f64 = 0.5;

/// Demand-model coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandParameters {
    /// BAIT below which heating is required (°C).
    pub heating_threshold: f64,
    /// Demand per degree below the threshold (kW/°C per capita).
    pub heating_power: f64,
    /// Weight of the previous day's BAIT; the day before gets its square.
    pub smoothing: f64,
    /// Effect of radiation above the expected level (°C per W/m²).
    pub solar_gains: f64,
    /// Effect of wind above the expected level (°C per m/s).
    pub wind_chill: f64,
    /// Effect of humidity above the expected level.
    pub humidity_discomfort: f64,
}

impl DemandParameters {
    /// Coefficients fitted for German residential buildings.
    pub const DEFAULT: Self = Self {
        heating_threshold: 15.0,
        heating_power: 0.107,
        smoothing: 0.42,
        solar_gains: 0.019,
        wind_chill: -0.13,
        humidity_discomfort: 0.032,
    };
}

impl Default for DemandParameters {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Daily mean conditions at one point.
#[derive(Debug, Clone, Copy)]
struct DailyMean {
    date: NaiveDate,
    temperature: f64,
    humidity: f64,
    radiation: f64,
    wind_speed: f64,
}

fn daily_means(samples: &[WeatherSample]) -> Vec<DailyMean> {
    let mut days: BTreeMap<NaiveDate, ([f64; 4], u32)> = BTreeMap::new();
    for sample in samples {
        let (sums, n) = days.entry(sample.time.date()).or_default();
        sums[0] += sample.temperature;
        sums[1] += sample.humidity;
        sums[2] += sample.radiation;
        sums[3] += sample.wind_speed;
        *n += 1;
    }

    days.into_iter()
        .map(|(date, (sums, n))| {
            let n = f64::from(n);
            DailyMean {
                date,
                temperature: sums[0] / n,
                humidity: sums[1] / n,
                radiation: sums[2] / n,
                wind_speed: sums[3] / n,
            }
        })
        .collect()
}

/// Unsmoothed BAIT of one day.
fn adjusted_temperature(day: &DailyMean, params: &DemandParameters) -> f64 {
    let t = day.temperature;
    let expected_radiation = 7.0f64.mul_add(t, 100.0);
    let expected_wind = 0.025f64.mul_add(-t, 4.5);
    let expected_humidity = 0.06f64.mul_add(t, 1.1).exp();

    let felt = (day.wind_speed - expected_wind).mul_add(
        params.wind_chill,
        (day.radiation - expected_radiation).mul_add(params.solar_gains, t),
    );

    // Humidity amplifies the distance from the comfort temperature.
    let discomfort = felt - SETPOINT_TEMPERATURE;
    let humidity_factor = (day.humidity - expected_humidity) / 1000.0 * params.humidity_discomfort;
    SETPOINT_TEMPERATURE + discomfort.mul_add(humidity_factor, discomfort)
}

/// Weighted mean of each day with its two predecessors.
fn smooth(values: &[f64], smoothing: f64) -> Vec<f64> {
    let Some(&first) = values.first() else {
        return Vec::new();
    };
    let w1 = smoothing;
    let w2 = smoothing * smoothing;
    let total = 1.0 + w1 + w2;

    (0..values.len())
        .map(|i| {
            let lag1 = if i >= 1 { values[i - 1] } else { first };
            let lag2 = if i >= 2 { values[i - 2] } else { first };
            w2.mul_add(lag2, w1.mul_add(lag1, values[i])) / total
        })
        .collect()
}

/// Share of raw temperature blended into BAIT, rising along a sigmoid
/// between [`LOWER_BLEND`] and [`UPPER_BLEND`].
fn raw_blend(temperature: f64) -> f64 {
    let mid = f64::midpoint(LOWER_BLEND, UPPER_BLEND);
    let x = (temperature - mid) * 10.0 / (UPPER_BLEND - LOWER_BLEND);
    MAX_RAW_BLEND / (1.0 + (-x).exp())
}

/// Daily BAIT values.
fn daily_bait(days: &[DailyMean], params: &DemandParameters) -> Vec<f64> {
    let adjusted: Vec<f64> = days
        .iter()
        .map(|d| adjusted_temperature(d, params))
        .collect();

    smooth(&adjusted, params.smoothing)
        .into_iter()
        .zip(days)
        .map(|(bait, day)| {
            let blend = raw_blend(day.temperature);
            day.temperature.mul_add(blend, bait * (1.0 - blend))
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn seconds_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64
}

/// Linear interpolation of values anchored at noon of each day, held
/// constant before the first and after the last anchor.
fn interpolate_hourly(anchors: &[(NaiveDateTime, f64)], time: NaiveDateTime) -> f64 {
    let idx = anchors.partition_point(|(t, _)| *t <= time);
    match (idx.checked_sub(1).and_then(|i| anchors.get(i)), anchors.get(idx)) {
        (Some(&(t0, v0)), Some(&(t1, v1))) => {
            let f = seconds_between(t0, time) / seconds_between(t0, t1);
            (v1 - v0).mul_add(f, v0)
        }
        (Some(&(_, v)), None) | (None, Some(&(_, v))) => v,
        (None, None) => f64::NAN,
    }
}

/// Hourly heating demand (kWh per capita) for one point.
///
/// `samples` must be the chronologically sorted series of a single point.
/// The result has one value per sample.
#[must_use]
pub fn heating_demand(samples: &[WeatherSample], params: &DemandParameters) -> Vec<f64> {
    let days = daily_means(samples);
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
    let anchors: Vec<(NaiveDateTime, f64)> = days
        .iter()
        .map(|d| d.date.and_time(noon))
        .zip(daily_bait(&days, params))
        .collect();

    samples
        .iter()
        .map(|s| {
            let bait = interpolate_hourly(&anchors, s.time);
            (params.heating_threshold - bait).max(0.0) * params.heating_power
        })
        .collect()
}

/// Runs the demand model for every grid point of `dataset`.
///
/// Samples are grouped by point and sorted by time before the model is
/// applied; the output is ordered by point then time.
#[must_use]
pub fn estimate_hourly_energy_demand(dataset: &WeatherDataset) -> Vec<HourlyDemand> {
    let mut by_point: BTreeMap<WeatherPoint, Vec<WeatherSample>> = BTreeMap::new();
    for sample in &dataset.samples {
        by_point.entry(sample.point).or_default().push(sample.clone());
    }

    let mut demand = Vec::with_capacity(dataset.samples.len());
    for (point, mut samples) in by_point {
        samples.sort_by_key(|s| s.time);
        let values = heating_demand(&samples, &DemandParameters::DEFAULT);
        demand.extend(
            samples
                .iter()
                .zip(values)
                .map(|(s, heating_demand)| HourlyDemand {
                    time: s.time,
                    point,
                    heating_demand,
                }),
        );
    }

    log::debug!(
        "Estimated hourly heating demand for {} samples",
        demand.len()
    );

    demand
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn series(
        point: WeatherPoint,
        days: i64,
        temperature: impl Fn(i64) -> f64,
    ) -> Vec<WeatherSample> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..days * 24)
            .map(|h| WeatherSample {
                time: start + Duration::hours(h),
                point,
                temperature: temperature(h),
                humidity: 4.0,
                radiation: 30.0,
                wind_speed: 4.0,
            })
            .collect()
    }

    #[test]
    fn no_demand_on_hot_days() {
        let samples = series(WeatherPoint::new(48.0, 11.0), 3, |_| 30.0);
        let demand = heating_demand(&samples, &DemandParameters::DEFAULT);
        assert_eq!(demand.len(), 72);
        assert!(demand.iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn demand_grows_as_it_gets_colder() {
        let mild = series(WeatherPoint::new(48.0, 11.0), 3, |_| 8.0);
        let cold = series(WeatherPoint::new(48.0, 11.0), 3, |_| -5.0);
        let mild = heating_demand(&mild, &DemandParameters::DEFAULT);
        let cold = heating_demand(&cold, &DemandParameters::DEFAULT);

        assert!(mild[30] > 0.0);
        assert!(cold[30] > mild[30]);
    }

    #[test]
    fn constant_weather_gives_flat_demand() {
        let samples = series(WeatherPoint::new(48.0, 11.0), 4, |_| 0.0);
        let demand = heating_demand(&samples, &DemandParameters::DEFAULT);
        let first = demand[0];
        assert!(demand.iter().all(|d| (d - first).abs() < 1e-9));
    }

    #[test]
    fn hours_are_interpolated_between_noons() {
        // 0 °C on day one, 10 °C on day two: midnight sits halfway.
        let samples = series(WeatherPoint::new(48.0, 11.0), 2, |h| if h < 24 { 0.0 } else { 10.0 });
        let params = DemandParameters {
            smoothing: 0.0,
            ..DemandParameters::DEFAULT
        };
        let demand = heating_demand(&samples, &params);

        assert!((demand[0] - demand[12]).abs() < 1e-12);
        assert!((demand[47] - demand[36]).abs() < 1e-12);
        let midpoint = f64::midpoint(demand[12], demand[36]);
        assert!((demand[24] - midpoint).abs() < 1e-9);
    }

    #[test]
    fn smoothing_weights() {
        let smoothed = smooth(&[0.0, 0.0, 10.0], 0.5);
        assert!((smoothed[2] - 10.0 / 1.75).abs() < 1e-12);
        assert!(smooth(&[], 0.5).is_empty());
    }

    #[test]
    fn blend_is_half_maximum_at_midpoint() {
        assert!((raw_blend(19.0) - 0.25).abs() < 1e-12);
        assert!(raw_blend(-10.0) < 0.01);
    }

    #[test]
    fn demand_per_point_in_order() {
        let a = WeatherPoint::new(48.0, 11.0);
        let b = WeatherPoint::new(48.25, 11.0);
        let mut samples = series(b, 1, |_| 5.0);
        samples.extend(series(a, 1, |_| 5.0));
        samples.reverse();
        let dataset = WeatherDataset {
            crs: "EPSG:4326".to_string(),
            samples,
        };

        let demand = estimate_hourly_energy_demand(&dataset);
        assert_eq!(demand.len(), 48);
        assert_eq!(demand[0].point, a);
        assert_eq!(demand[24].point, b);
        assert!(demand.windows(2).take(23).all(|w| w[0].time < w[1].time));
    }
}
