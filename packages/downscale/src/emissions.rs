//! Hourly demand to per-cell monthly and regional hourly/daily emissions.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use heating_emissions_census_models::{CalculatedCell, CellId, CensusTable};
use heating_emissions_weather_models::{HourlyDemand, WeatherPoint};
use serde::{Deserialize, Serialize};

/// Emissions of one month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyEmissions {
    /// kg CO2 per cell over the month.
    pub per_cell: BTreeMap<CellId, f64>,
    /// kg CO2 of the whole AOI for each hour.
    pub hourly: BTreeMap<NaiveDateTime, f64>,
}

/// Regional emissions of one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEmission {
    /// Calendar day (UTC).
    pub date: NaiveDate,
    /// kg CO2.
    pub co2_emissions: f64,
}

/// Multiplies each cell's assigned hourly demand by its population and
/// emission factor.
///
/// Cells without an assigned point, or whose point has no demand at a
/// given hour, contribute zero for that hour.
#[must_use]
pub fn calculate_hourly_emissions_per_month(
    demand: &[HourlyDemand],
    census: &CensusTable<CalculatedCell>,
    assignment: &BTreeMap<CellId, WeatherPoint>,
) -> MonthlyEmissions {
    let mut by_point: BTreeMap<WeatherPoint, Vec<(NaiveDateTime, f64)>> = BTreeMap::new();
    for row in demand {
        by_point
            .entry(row.point)
            .or_default()
            .push((row.time, row.heating_demand));
    }

    let mut monthly = MonthlyEmissions::default();
    for time in demand.iter().map(|d| d.time) {
        monthly.hourly.entry(time).or_insert(0.0);
    }

    for (id, cell) in census.iter() {
        let scale = cell.population * cell.emission_factor;
        let series = assignment.get(id).and_then(|p| by_point.get(p));

        let mut total = 0.0;
        for &(time, heating_demand) in series.into_iter().flatten() {
            let emission = heating_demand * scale;
            total += emission;
            *monthly.hourly.entry(time).or_insert(0.0) += emission;
        }
        monthly.per_cell.insert(id.clone(), total);
    }

    monthly
}

/// Sums hourly regional emissions into calendar days.
#[must_use]
pub fn daily_totals(hourly: &BTreeMap<NaiveDateTime, f64>) -> Vec<DailyEmission> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (time, value) in hourly {
        *days.entry(time.date()).or_insert(0.0) += value;
    }
    days.into_iter()
        .map(|(date, co2_emissions)| DailyEmission {
            date,
            co2_emissions,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::join::tests::calculated;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn flat_demand(point: WeatherPoint, hours: i64, value: f64) -> Vec<HourlyDemand> {
        (0..hours)
            .map(|h| HourlyDemand {
                time: start() + Duration::hours(h),
                point,
                heating_demand: value,
            })
            .collect()
    }

    #[test]
    fn emissions_scale_with_population_and_factor() {
        let a = WeatherPoint::new(48.0, 12.0);
        let b = WeatherPoint::new(48.0, 12.25);
        let mut demand = flat_demand(a, 3, 1.0);
        demand.extend(flat_demand(b, 3, 2.0));

        let census: CensusTable<CalculatedCell> = [
            ("x".to_string(), calculated("x", 12.0, 48.0, 10.0, 0.2)),
            ("y".to_string(), calculated("y", 12.25, 48.0, 5.0, 0.3)),
            ("z".to_string(), calculated("z", 12.5, 48.0, 5.0, 0.3)),
        ]
        .into_iter()
        .collect();
        let assignment: BTreeMap<CellId, WeatherPoint> =
            [("x".to_string(), a), ("y".to_string(), b)].into_iter().collect();

        let monthly = calculate_hourly_emissions_per_month(&demand, &census, &assignment);

        assert!((monthly.per_cell["x"] - 6.0).abs() < 1e-9);
        assert!((monthly.per_cell["y"] - 9.0).abs() < 1e-9);
        assert!(monthly.per_cell["z"].abs() < 1e-12);
        assert_eq!(monthly.hourly.len(), 3);
        assert!(monthly.hourly.values().all(|v| (v - 5.0).abs() < 1e-9));
    }

    #[test]
    fn hours_sum_into_days() {
        let hourly: BTreeMap<NaiveDateTime, f64> =
            (0..48).map(|h| (start() + Duration::hours(h), 1.5)).collect();
        let daily = daily_totals(&hourly);

        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2022, 1, 1).unwrap());
        assert!((daily[0].co2_emissions - 36.0).abs() < 1e-9);
        assert!((daily[1].co2_emissions - 36.0).abs() < 1e-9);
    }
}
