#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Heating emissions operator.
//!
//! Validates a request, computes the gridded yearly emissions of an AOI
//! and, when asked to, the weather-driven temporal downscaling. Failures
//! of the temporal branch are reported in the output instead of failing
//! the whole computation.

pub mod export;
pub mod settings;

use std::sync::Arc;

use chrono::Datelike as _;
use heating_emissions_calculator::{AoiSummary, EmissionsRecord, calculate_heating_emissions};
use heating_emissions_census::{CensusData, CensusError, CensusTables, collect_census_data};
use heating_emissions_census_models::CensusTable;
use heating_emissions_database::{DbError, census_db};
use heating_emissions_downscale::{DownscaleResult, calculate_time_downscale_emissions};
use heating_emissions_spatial::{Aoi, SpatialError, area_km2_utm32n, germany};
use heating_emissions_weather::{
    AcquisitionRequest, CdsClient, ClimateDataStore, ProgressCallback, WeatherError,
};

pub use export::export;
pub use heating_emissions_weather::{NullProgress, null_progress};
pub use settings::Settings;

/// Earliest year with reanalysis coverage accepted for downscaling.
pub const MIN_YEAR: i32 = 2017;

/// Year simulated when none is given.
pub const DEFAULT_YEAR: i32 = 2022;

/// Largest AOI accepted, in km² (UTM 32N).
pub const MAX_AREA_KM2: f64 = 30_000.0;

/// Buffer (degrees) added around the AOI when requesting weather.
const WEATHER_AREA_BUFFER: f64 = 0.000_001;

/// Errors from the operator.
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    /// Requested year outside the supported range.
    #[error("The year {year} is not supported. Please choose a year between {min} and {max}.")]
    InvalidYear {
        /// Requested year.
        year: i32,
        /// Earliest supported year.
        min: i32,
        /// Latest supported year.
        max: i32,
    },

    /// The AOI lies outside the census coverage.
    #[error(
        "Currently the Heating Emissions Plugin is only available for Germany. {name} does not intersect Boundaries for Germany"
    )]
    OutsideGermany {
        /// AOI display name.
        name: String,
    },

    /// The AOI exceeds [`MAX_AREA_KM2`].
    #[error(
        "The selected area is too large: {area_km2} km². Currently, the maximum allowed area is 30000 km². Please select a smaller area or a sub-region of your selected area."
    )]
    AoiTooLarge {
        /// Measured area in km².
        area_km2: f64,
    },

    /// Census data collection failed.
    #[error(transparent)]
    Census(#[from] CensusError),

    /// Geometry error.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Database error.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Climate data store client error.
    #[error(transparent)]
    Weather(#[from] WeatherError),

    /// Invalid settings.
    #[error("Invalid settings: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// Filesystem error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV export error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON export error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OperatorError {
    /// Whether the message should be shown to the end user as-is.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        match self {
            Self::InvalidYear { .. } | Self::OutsideGermany { .. } | Self::AoiTooLarge { .. } => {
                true
            }
            Self::Census(e) => e.is_user_error(),
            _ => false,
        }
    }
}

/// Computation parameters chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeInput {
    /// Whether to run the temporal downscaling.
    pub temporal: bool,
    /// Simulated year.
    pub year: i32,
}

impl Default for ComputeInput {
    fn default() -> Self {
        Self {
            temporal: false,
            year: DEFAULT_YEAR,
        }
    }
}

impl ComputeInput {
    /// Latest supported year: the year before the current one.
    #[must_use]
    pub fn max_year() -> i32 {
        chrono::Utc::now().year() - 1
    }

    /// Checks the year against [`MIN_YEAR`] and [`Self::max_year`].
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError::InvalidYear`] if the year is out of range.
    pub fn validate(&self) -> Result<(), OperatorError> {
        let max = Self::max_year();
        if (MIN_YEAR..=max).contains(&self.year) {
            Ok(())
        } else {
            Err(OperatorError::InvalidYear {
                year: self.year,
                min: MIN_YEAR,
                max,
            })
        }
    }
}

/// Checks that the AOI intersects Germany and is not too large.
///
/// # Errors
///
/// * [`OperatorError::OutsideGermany`] if the AOI misses Germany
/// * [`OperatorError::AoiTooLarge`] if it exceeds [`MAX_AREA_KM2`]
pub fn check_aoi(aoi: &Aoi) -> Result<(), OperatorError> {
    if !germany::intersects(&aoi.geometry)? {
        return Err(OperatorError::OutsideGermany {
            name: aoi.name.clone(),
        });
    }

    let area_km2 = area_km2_utm32n(&aoi.geometry);
    log::debug!("AOI {} covers {area_km2:.1} km²", aoi.name);
    if area_km2 > MAX_AREA_KM2 {
        return Err(OperatorError::AoiTooLarge { area_km2 });
    }

    Ok(())
}

/// Result of the optional temporal branch.
#[derive(Debug, Clone, PartialEq)]
pub enum TemporalOutcome {
    /// The user did not ask for it.
    NotRequested,
    /// Downscaling finished.
    Completed(DownscaleResult),
    /// Downscaling failed; the message is meant for the user.
    Failed(String),
}

/// Everything computed for one AOI.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOutput {
    /// AOI display name.
    pub aoi_name: String,
    /// Simulated year.
    pub year: i32,
    /// Cleaned census tables.
    pub census: CensusData,
    /// Per-cell yearly emissions.
    pub emissions: CensusTable<EmissionsRecord>,
    /// Distribution summaries.
    pub summary: AoiSummary,
    /// Temporal downscaling outcome.
    pub temporal: TemporalOutcome,
}

/// Runs computations against a census store and, optionally, a climate
/// data store.
pub struct Operator<T: CensusTables> {
    tables: T,
    store: Option<Arc<dyn ClimateDataStore>>,
    settings: Settings,
}

impl Operator<duckdb::Connection> {
    /// Opens the census database and, if a key is configured, the climate
    /// data store client named in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError`] if the database cannot be opened or the
    /// HTTP client cannot be built.
    pub fn from_settings(settings: Settings) -> Result<Self, OperatorError> {
        let tables = census_db::open(&settings.database)?;

        let store: Option<Arc<dyn ClimateDataStore>> = match settings.cdsapi_key.as_deref() {
            Some(key) => Some(Arc::new(CdsClient::new(&settings.cdsapi_url, key)?)),
            None => {
                log::debug!("No climate data store key configured");
                None
            }
        };

        Ok(Self::new(tables, store, settings))
    }
}

impl<T: CensusTables> Operator<T> {
    /// Creates an operator from its parts.
    #[must_use]
    pub fn new(tables: T, store: Option<Arc<dyn ClimateDataStore>>, settings: Settings) -> Self {
        Self {
            tables,
            store,
            settings,
        }
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Computes the emissions of `aoi`.
    ///
    /// The yearly gridded result is always produced; the temporal branch
    /// runs only if `input.temporal` is set and its failure is reported in
    /// [`ComputeOutput::temporal`].
    ///
    /// # Errors
    ///
    /// Returns [`OperatorError`] if the input or AOI is rejected or the
    /// census data cannot be collected.
    #[allow(clippy::future_not_send)]
    pub async fn compute(
        &self,
        aoi: &Aoi,
        input: &ComputeInput,
        progress: &dyn ProgressCallback,
    ) -> Result<ComputeOutput, OperatorError> {
        input.validate()?;
        check_aoi(aoi)?;

        log::info!("Collecting census data for {}", aoi.name);
        let census = collect_census_data(&self.tables, aoi)?;

        let emissions = calculate_heating_emissions(&census.calculated);
        let summary = AoiSummary::from_result(&emissions);
        log::info!(
            "{} cells, {:.1} t CO2/year",
            summary.cells,
            summary.total_co2_emissions / 1e3
        );

        let temporal = if input.temporal {
            self.run_temporal(aoi, input.year, &census, progress).await
        } else {
            TemporalOutcome::NotRequested
        };

        Ok(ComputeOutput {
            aoi_name: aoi.name.clone(),
            year: input.year,
            census,
            emissions,
            summary,
            temporal,
        })
    }

    #[allow(clippy::future_not_send)]
    async fn run_temporal(
        &self,
        aoi: &Aoi,
        year: i32,
        census: &CensusData,
        progress: &dyn ProgressCallback,
    ) -> TemporalOutcome {
        let Some(store) = self.store.as_deref() else {
            log::warn!("Temporal downscaling requested but CDSAPI_KEY is not set");
            return TemporalOutcome::Failed(
                "Temporal flexible simulation is not available: no climate data store key is configured."
                    .to_string(),
            );
        };

        let area = match aoi.bounding_box() {
            Ok(bbox) => bbox.buffered(WEATHER_AREA_BUFFER).to_cds_area(),
            Err(e) => return TemporalOutcome::Failed(e.to_string()),
        };

        let request = AcquisitionRequest {
            aoi_name: aoi.name.clone(),
            area,
            year,
            months: self.settings.months(),
            target_dir: self.settings.weather_dir.clone(),
            poll_interval: self.settings.poll_interval(),
        };

        match calculate_time_downscale_emissions(
            store,
            &request,
            &census.calculated,
            self.settings.runtime_limit(),
            progress,
        )
        .await
        {
            Ok(result) => TemporalOutcome::Completed(result),
            Err(e) => {
                if e.is_user_error() {
                    log::warn!("{e}");
                } else {
                    log::error!("Temporal downscaling failed: {e}");
                }
                TemporalOutcome::Failed(e.to_string())
            }
        }
    }
}
