#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Temporal Downscaler.
//!
//! Spreads the yearly emissions of each census cell over the hours of the
//! target year using weather-driven heating demand: per month, download
//! and read the reanalysis archive, run the demand model per weather grid
//! point, and weight each cell's nearest point by its population and
//! emission factor.

pub mod demand;
pub mod emissions;
pub mod join;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use heating_emissions_census_models::{CalculatedCell, CellId, CensusTable};
use heating_emissions_weather::{
    AcquisitionRequest, ClimateDataStore, ProgressCallback, WeatherError, acquire_until,
    open_archive,
};
use heating_emissions_weather_models::WeatherPoint;
use tokio::time::Instant;

pub use demand::{DemandParameters, estimate_hourly_energy_demand, heating_demand};
pub use emissions::{
    DailyEmission, MonthlyEmissions, calculate_hourly_emissions_per_month, daily_totals,
};
pub use join::assign_nearest_weather_points;

/// Errors from temporal downscaling.
#[derive(Debug, thiserror::Error)]
pub enum DownscaleError {
    /// Weather acquisition or archive reading failed.
    #[error(transparent)]
    Weather(#[from] WeatherError),

    /// The deadline passed while months were still being processed.
    #[error(
        "Temporal downscaling exceeded the time limit of {limit_minutes:.2} minutes after {completed_months} of {total_months} months. Temporal flexible simulation will not be computed."
    )]
    Timeout {
        /// Runtime limit in minutes.
        limit_minutes: f64,
        /// Months fully processed before the deadline.
        completed_months: usize,
        /// Months requested.
        total_months: usize,
    },

    /// An archive held no complete weather records.
    #[error("No weather data in {path}")]
    NoWeatherData {
        /// Archive path.
        path: String,
    },

    /// A month's blocking task panicked or was cancelled.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

impl DownscaleError {
    /// Whether the message should be shown to the end user as-is.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        match self {
            Self::Weather(e) => e.is_user_error(),
            Self::Timeout { .. } => true,
            Self::NoWeatherData { .. } | Self::Join(_) => false,
        }
    }
}

/// Downscaled emissions for the requested months.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownscaleResult {
    /// kg CO2 per cell, summed over all months.
    pub yearly: BTreeMap<CellId, f64>,
    /// kg CO2 of the whole AOI per calendar day.
    pub daily: Vec<DailyEmission>,
    /// kg CO2 of the whole AOI per hour.
    pub hourly: BTreeMap<NaiveDateTime, f64>,
}

type Assignment = BTreeMap<CellId, WeatherPoint>;

/// Reads one archive and spreads the census over its hours.
///
/// `assignment` is computed from this archive's points when `None`.
fn downscale_month(
    path: &Path,
    census: &CensusTable<CalculatedCell>,
    assignment: Option<Assignment>,
) -> Result<(MonthlyEmissions, Assignment), DownscaleError> {
    let dataset = open_archive(path)?;
    if dataset.samples.is_empty() {
        return Err(DownscaleError::NoWeatherData {
            path: path.display().to_string(),
        });
    }

    let demand = estimate_hourly_energy_demand(&dataset);
    let assignment =
        assignment.unwrap_or_else(|| assign_nearest_weather_points(census, &dataset.points()));

    let monthly = calculate_hourly_emissions_per_month(&demand, census, &assignment);
    Ok((monthly, assignment))
}

/// Downloads the weather of every requested month and distributes the
/// census cells' emissions over time.
///
/// A single deadline, `runtime_limit` from the call, bounds both the
/// downloads and the per-month processing. Each month is read and modelled
/// on the blocking pool. The cell to weather point assignment is computed
/// from the first month and reused.
///
/// # Errors
///
/// * [`DownscaleError::Weather`] if acquisition or an archive fails
/// * [`DownscaleError::Timeout`] if the deadline passes before every month
///   is processed
/// * [`DownscaleError::NoWeatherData`] if an archive has no usable records
/// * [`DownscaleError::Join`] if a month's task panics
pub async fn calculate_time_downscale_emissions(
    store: &dyn ClimateDataStore,
    request: &AcquisitionRequest,
    census: &CensusTable<CalculatedCell>,
    runtime_limit: Duration,
    progress: &dyn ProgressCallback,
) -> Result<DownscaleResult, DownscaleError> {
    let deadline = Instant::now() + runtime_limit;

    progress.set_message(format!("Downloading weather for {}", request.aoi_name));
    let archives = acquire_until(store, request, deadline, runtime_limit).await?;

    let total_months = archives.len();
    progress.set_total(total_months as u64);

    let mut result = DownscaleResult {
        yearly: census.ids().map(|id| (id.clone(), 0.0)).collect(),
        ..DownscaleResult::default()
    };
    let census = Arc::new(census.clone());
    let mut assignment: Option<Assignment> = None;

    for (completed_months, (month, path)) in request.months.clone().zip(&archives).enumerate() {
        let timeout = || DownscaleError::Timeout {
            limit_minutes: runtime_limit.as_secs_f64() / 60.0,
            completed_months,
            total_months,
        };
        if Instant::now() >= deadline {
            return Err(timeout());
        }

        progress.set_message(format!("Downscaling month {month}"));
        log::debug!("Downscaling {} month {month}", request.year);

        let task = tokio::task::spawn_blocking({
            let census = Arc::clone(&census);
            let path = path.clone();
            let assignment = assignment.take();
            move || downscale_month(&path, &census, assignment)
        });
        let (monthly, nearest) = tokio::time::timeout_at(deadline, task)
            .await
            .map_err(|_| timeout())???;
        assignment = Some(nearest);

        for (id, value) in monthly.per_cell {
            *result.yearly.entry(id).or_insert(0.0) += value;
        }
        for (time, value) in monthly.hourly {
            *result.hourly.entry(time).or_insert(0.0) += value;
        }

        progress.inc(1);
    }

    result.daily = daily_totals(&result.hourly);
    progress.finish_and_clear();

    log::info!(
        "Downscaled {} cells over {} days",
        result.yearly.len(),
        result.daily.len()
    );

    Ok(result)
}
